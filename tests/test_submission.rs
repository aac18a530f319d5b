
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::PathBuf;

use omics_mock::{INPUT_BUCKET, MockOmics, dispatcher, test_config};
use omics_run_dispatcher::domain::manifest::ManifestLocation;
use omics_run_dispatcher::domain::storage::ArtifactStore;
use omics_run_dispatcher::domain::submission::SubmissionPlan;
use omics_run_dispatcher::error::Error;

fn samples_dir(root: &tempfile::TempDir, name: &str, files: &[&str]) -> PathBuf {
    let dir = root.path().join(name);
    fs::create_dir(&dir).unwrap();
    for file in files {
        fs::write(dir.join(file), b"@read\nACGT\n+\nIIII\n").unwrap();
    }
    dir
}

fn workflows(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_prepare_derives_run_id_and_samplesheets() {
    let root = tempfile::tempdir().unwrap();
    let dir = samples_dir(&root, "run_01", &["s2_1.fastq.gz", "s2_2.fastq.gz", "s1_R1.fastq.gz", "s1_R2.fastq.gz"]);
    let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    let plan = SubmissionPlan::prepare(&dir, INPUT_BUCKET, None, &workflows(&["MAG", "ampliseq"]), &[], created_at).unwrap();

    assert_eq!(plan.run_id, "run_01");
    assert_eq!(plan.pairs.len(), 2);
    assert_eq!(plan.manifest.workflows, vec!["mag", "ampliseq"]);
    let (_, ampliseq) = &plan.samplesheets[1];
    assert_eq!(
        ampliseq,
        "sampleID,forwardReads,reverseReads\n\
         s1,s3://input-bucket/run_01/s1_R1.fastq.gz,s3://input-bucket/run_01/s1_R2.fastq.gz\n\
         s2,s3://input-bucket/run_01/s2_1.fastq.gz,s3://input-bucket/run_01/s2_2.fastq.gz\n"
    );

    let written = plan.write_local().unwrap();
    assert_eq!(written.len(), 3);
    assert!(dir.join("run_manifest.json").is_file());
}

#[test]
fn test_prepare_rejects_bad_inputs() {
    let root = tempfile::tempdir().unwrap();
    let empty = samples_dir(&root, "empty", &["s1_R1.fastq.gz"]);
    let at = Utc::now();
    assert!(matches!(
        SubmissionPlan::prepare(&empty, INPUT_BUCKET, None, &workflows(&["mag"]), &[], at),
        Err(Error::SubmissionError(_))
    ));

    let dir = samples_dir(&root, "run_02", &["s1_R1.fastq.gz", "s1_R2.fastq.gz"]);
    let bad_json = root.path().join("params_mag.json");
    fs::write(&bad_json, "{\"max_cpus\": ").unwrap();
    assert!(matches!(
        SubmissionPlan::prepare(&dir, INPUT_BUCKET, None, &workflows(&["mag"]), &[("mag".to_string(), bad_json.clone())], at),
        Err(Error::SubmissionError(_))
    ));

    fs::write(&bad_json, "{\"max_cpus\": 8}").unwrap();
    assert!(matches!(
        SubmissionPlan::prepare(&dir, INPUT_BUCKET, None, &workflows(&["mag"]), &[("ampliseq".to_string(), bad_json)], at),
        Err(Error::SubmissionError(_))
    ));
}

#[tokio::test]
async fn test_uploaded_submission_dispatches_every_workflow() {
    let root = tempfile::tempdir().unwrap();
    let dir = samples_dir(&root, "samples", &["s1_R1.fastq.gz", "s1_R2.fastq.gz"]);
    let params = root.path().join("mag.json");
    fs::write(&params, "{\"skip_binqc\": true}").unwrap();

    let plan = SubmissionPlan::prepare(
        &dir,
        INPUT_BUCKET,
        Some("run_09"),
        &workflows(&["mag", "metatdenovo"]),
        &[("mag".to_string(), params)],
        Utc::now(),
    )
    .unwrap();
    let store = ArtifactStore::in_memory(INPUT_BUCKET);

    let uploaded = plan.upload(&store).await.unwrap();

    assert_eq!(uploaded.last().map(String::as_str), Some("run_09/run_manifest.json"));
    assert_eq!(uploaded.iter().filter(|k| k.ends_with(".fastq.gz")).count(), 2);
    assert!(uploaded.contains(&"run_09/params_mag.json".to_string()));

    let mut config = test_config();
    config.verify_reads = true;
    let omics = MockOmics::new();
    let report = dispatcher(config, store, omics.clone())
        .process_manifest(&ManifestLocation::new(INPUT_BUCKET, "run_09/run_manifest.json"))
        .await
        .unwrap();

    assert!(report.is_complete_success(), "{}", report);
    assert_eq!(omics.started_names(), vec!["run_09_mag".to_string(), "run_09_metatdenovo".to_string()]);
}
