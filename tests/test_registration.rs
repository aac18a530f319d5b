
use omics_mock::MockOmics;
use omics_run_dispatcher::domain::omics::api::WorkflowSummary;
use omics_run_dispatcher::domain::registration::{Registration, WorkflowRegistrar, PipelineVersion};
use omics_run_dispatcher::domain::utils::id::OmicsWorkflowId;

#[tokio::test]
async fn test_register_creates_once_then_reuses() {
    let omics = MockOmics::new();
    let registrar = WorkflowRegistrar::new(omics.clone(), "code-bucket", Some(1200));
    let pipeline = PipelineVersion::parse("mag:3.0.0").unwrap();

    let first = registrar.ensure_registered(&pipeline).await.unwrap();
    let second = registrar.ensure_registered(&pipeline).await.unwrap();

    assert!(matches!(first, Registration::Created(_)));
    assert!(matches!(second, Registration::Existing(_)));
    assert_eq!(first.summary().workflow_id, second.summary().workflow_id);

    let created = omics.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, "nfcore-mag-3-0-0");
    assert_eq!(created[0].definition_uri, "s3://code-bucket/mag/nf-core-mag_3.0.0.zip");
    assert_eq!(created[0].storage_capacity, Some(1200));
    assert_eq!(created[0].tags.get("Version").map(String::as_str), Some("3.0.0"));
}

#[tokio::test]
async fn test_existing_workflow_is_not_recreated() {
    let omics = MockOmics::new();
    omics.existing_workflows.lock().unwrap().push(WorkflowSummary {
        workflow_id: OmicsWorkflowId::new("7777777"),
        arn: None,
        name: "nfcore-metatdenovo-1-2-0".to_string(),
        status: Some("ACTIVE".to_string()),
    });
    let registrar = WorkflowRegistrar::new(omics.clone(), "code-bucket", None);

    let registration = registrar.ensure_registered(&PipelineVersion::parse("MetaTdenovo:1.2.0").unwrap()).await.unwrap();

    assert_eq!(registration.summary().workflow_id, "7777777");
    assert!(omics.created.lock().unwrap().is_empty());
}
