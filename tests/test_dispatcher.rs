
use omics_mock::{FlakyStore, INPUT_BUCKET, MockOmics, dispatcher, put, seed_run, test_config};
use omics_run_dispatcher::domain::dispatcher::report::{DispatchPhase, WorkflowOutcome};
use omics_run_dispatcher::domain::manifest::ManifestLocation;
use omics_run_dispatcher::domain::storage::ArtifactStore;
use omics_run_dispatcher::error::Error;
use serde_json::json;
use std::time::Duration;

fn manifest_at(run_id: &str) -> ManifestLocation {
    ManifestLocation::new(INPUT_BUCKET, format!("{}/run_manifest.json", run_id))
}

#[tokio::test]
async fn test_single_workflow_run_is_started_with_derived_name_and_parameters() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    seed_run(&store, "run_01", &["mag"]).await;
    let omics = MockOmics::new();

    let report = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_01")).await.unwrap();

    assert_eq!(report.phase, DispatchPhase::Completed);
    assert!(report.is_complete_success());

    let started = omics.started.lock().unwrap();
    assert_eq!(started.len(), 1);
    let request = &started[0];
    assert_eq!(request.run_name, "run_01_mag");
    assert_eq!(request.request_id, "run_01_mag");
    assert_eq!(request.workflow_id, "1111111");
    assert_eq!(request.role_arn, "arn:aws:iam::123456789012:role/OmicsWorkflowRole");
    assert_eq!(request.run_group_id.as_deref(), Some("rg-42"));
    assert_eq!(request.output_uri, "s3://output-bucket/run_01/mag/");
    assert_eq!(
        request.parameters,
        json!({"input": "s3://input-bucket/run_01/samplesheet_mag.csv", "outdir": "s3://output-bucket/run_01/mag/"})
    );
    assert_eq!(request.tags.get("run_id").map(String::as_str), Some("run_01"));
    assert_eq!(request.tags.get("workflow").map(String::as_str), Some("mag"));
}

#[tokio::test]
async fn test_redelivered_manifest_starts_exactly_one_run() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    seed_run(&store, "run_01", &["mag"]).await;
    let omics = MockOmics::new();
    let dispatcher = dispatcher(test_config(), store, omics.clone());

    let first = dispatcher.process_manifest(&manifest_at("run_01")).await.unwrap();
    let second = dispatcher.process_manifest(&manifest_at("run_01")).await.unwrap();

    assert_eq!(omics.start_count(), 1);
    assert!(matches!(first.results[0].outcome, WorkflowOutcome::Started(_)));
    match &second.results[0].outcome {
        WorkflowOutcome::AlreadyDispatched(handle) => {
            assert_eq!(Some(handle), first.results[0].outcome.handle());
        }
        other => panic!("expected AlreadyDispatched, got {:?}", other),
    }
    assert!(second.is_complete_success());
}

#[tokio::test]
async fn test_missing_samplesheet_fails_only_its_workflow() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    put(&store, "run_02/samplesheet_mag.csv", "sample,fastq_1,fastq_2\n").await;
    let manifest = json!({
        "run_id": "run_02",
        "workflows": ["mag", "metatdenovo"],
        "samplesheet_mag.csv": "run_02/samplesheet_mag.csv",
        "samplesheet_metatdenovo.csv": "run_02/samplesheet_metatdenovo.csv"
    });
    put(&store, "run_02/run_manifest.json", &manifest.to_string()).await;
    let omics = MockOmics::new();

    let report = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_02")).await.unwrap();

    assert_eq!(report.phase, DispatchPhase::Completed);
    assert_eq!(omics.started_names(), vec!["run_02_mag".to_string()]);

    let failed = report.result_for("metatdenovo").unwrap();
    match failed.outcome.error() {
        Some(Error::MissingArtifactError { run_id, workflow, key }) => {
            assert_eq!(run_id, "run_02");
            assert_eq!(workflow, "metatdenovo");
            assert_eq!(key, "run_02/samplesheet_metatdenovo.csv");
        }
        other => panic!("expected MissingArtifactError, got {:?}", other),
    }
    assert!(!report.has_retryable_failures());
}

#[tokio::test]
async fn test_all_artifacts_missing_dispatches_nothing() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    let manifest = json!({"run_id": "run_03", "workflows": ["mag"], "samplesheet_mag.csv": "samplesheet_mag.csv"});
    put(&store, "run_03/run_manifest.json", &manifest.to_string()).await;
    let omics = MockOmics::new();

    let report = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_03")).await.unwrap();

    assert_eq!(report.phase, DispatchPhase::MissingArtifacts);
    assert_eq!(omics.start_count(), 0);
}

#[tokio::test]
async fn test_empty_workflow_list_is_rejected_without_dispatch() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    put(&store, "run_04/run_manifest.json", r#"{"run_id":"run_04","workflows":[]}"#).await;
    let omics = MockOmics::new();

    let result = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_04")).await;

    assert!(matches!(result, Err(Error::ValidationError { .. })));
    assert_eq!(omics.start_count(), 0);
}

#[tokio::test]
async fn test_malformed_manifest_is_a_validation_error() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    put(&store, "run_05/run_manifest.json", "{not json").await;

    let result = dispatcher(test_config(), store, MockOmics::new()).process_manifest(&manifest_at("run_05")).await;

    match result {
        Err(Error::ValidationError { run_id, manifest_key, .. }) => {
            assert_eq!(run_id, "run_05");
            assert_eq!(manifest_key, "run_05/run_manifest.json");
        }
        other => panic!("expected ValidationError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_start_failure_is_reported_per_workflow_and_retryable() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    seed_run(&store, "run_06", &["mag", "metatdenovo"]).await;
    let omics = MockOmics::new();
    omics.fail_workflow("2222222");
    let mut config = test_config();
    config.dispatch_concurrency = 2;

    let report = dispatcher(config, store, omics.clone()).process_manifest(&manifest_at("run_06")).await.unwrap();

    assert_eq!(report.results.iter().map(|r| r.workflow.as_str()).collect::<Vec<_>>(), vec!["mag", "metatdenovo"]);
    assert!(report.result_for("mag").unwrap().outcome.is_success());
    match report.result_for("metatdenovo").unwrap().outcome.error() {
        Some(Error::DispatchError { run_name, .. }) => assert_eq!(run_name, "run_06_metatdenovo"),
        other => panic!("expected DispatchError, got {:?}", other),
    }
    assert!(report.has_retryable_failures());
    assert_eq!(omics.start_count(), 1);
}

#[tokio::test]
async fn test_params_file_is_passed_and_checked() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    put(&store, "run_07/samplesheet_mag.csv", "sample,fastq_1,fastq_2\n").await;
    put(&store, "run_07/params_mag.json", r#"{"skip_binning": true}"#).await;
    let manifest = json!({
        "run_id": "run_07",
        "workflows": ["mag"],
        "samplesheet_mag.csv": "run_07/samplesheet_mag.csv",
        "params_mag.json": "run_07/params_mag.json"
    });
    put(&store, "run_07/run_manifest.json", &manifest.to_string()).await;
    let omics = MockOmics::new();

    dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_07")).await.unwrap();

    let started = omics.started.lock().unwrap();
    assert_eq!(started[0].parameters["params"], "s3://input-bucket/run_07/params_mag.json");
}

#[tokio::test]
async fn test_missing_read_is_detected_when_verification_is_enabled() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    put(&store, "run_08/a_R1.fastq.gz", "@r1").await;
    put(
        &store,
        "run_08/samplesheet_mag.csv",
        "sample,fastq_1,fastq_2\na,s3://input-bucket/run_08/a_R1.fastq.gz,s3://input-bucket/run_08/a_R2.fastq.gz\n",
    )
    .await;
    let manifest = json!({"run_id": "run_08", "workflows": ["mag"], "samplesheet_mag.csv": "samplesheet_mag.csv"});
    put(&store, "run_08/run_manifest.json", &manifest.to_string()).await;
    let mut config = test_config();
    config.verify_reads = true;
    let omics = MockOmics::new();

    let report = dispatcher(config, store, omics.clone()).process_manifest(&manifest_at("run_08")).await.unwrap();

    assert_eq!(report.phase, DispatchPhase::MissingArtifacts);
    match report.results[0].outcome.error() {
        Some(Error::MissingArtifactError { key, .. }) => assert_eq!(key, "run_08/a_R2.fastq.gz"),
        other => panic!("expected MissingArtifactError, got {:?}", other),
    }
    assert_eq!(omics.start_count(), 0);
}

#[tokio::test]
async fn test_unconfigured_workflow_does_not_block_configured_siblings() {
    let store = ArtifactStore::in_memory(INPUT_BUCKET);
    seed_run(&store, "run_09", &["mag", "rnaseq"]).await;
    let omics = MockOmics::new();

    let report = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_09")).await.unwrap();

    assert_eq!(report.phase, DispatchPhase::Completed);
    assert_eq!(omics.started_names(), vec!["run_09_mag".to_string()]);
    assert!(matches!(report.result_for("mag").unwrap().outcome, WorkflowOutcome::Started(_)));
    match report.result_for("rnaseq").unwrap().outcome.error() {
        Some(Error::ValidationError { run_id, reason, .. }) => {
            assert_eq!(run_id, "run_09");
            assert!(reason.contains("rnaseq"), "{}", reason);
        }
        other => panic!("expected ValidationError for rnaseq, got {:?}", other),
    }
    assert!(!report.is_complete_success());
}

#[tokio::test]
async fn test_storage_outage_during_resolution_is_retryable_not_missing() {
    let flaky = FlakyStore::failing_heads();
    let store = ArtifactStore::new(INPUT_BUCKET, flaky, Duration::from_secs(5));
    seed_run(&store, "run_10", &["mag"]).await;
    let omics = MockOmics::new();

    let report = dispatcher(test_config(), store, omics.clone()).process_manifest(&manifest_at("run_10")).await.unwrap();

    assert_ne!(report.phase, DispatchPhase::MissingArtifacts);
    assert_eq!(omics.start_count(), 0);
    assert!(matches!(report.result_for("mag").unwrap().outcome.error(), Some(Error::StorageError { .. })));
    assert!(report.has_retryable_failures());
}
