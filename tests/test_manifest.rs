use chrono::{TimeZone, Utc};
use omics_run_dispatcher::api::manifest_dto::RunManifestDto;
use omics_run_dispatcher::domain::manifest::{ManifestLocation, build_manifest, validate};
use omics_run_dispatcher::domain::utils::id::WorkflowName;
use omics_run_dispatcher::error::Error;
use omics_run_dispatcher::loader::parser::parse_json_bytes;

fn parse(json: &str) -> RunManifestDto {
    parse_json_bytes(json.as_bytes()).unwrap()
}

fn location(key: &str) -> ManifestLocation {
    ManifestLocation::new("input-bucket", key)
}

fn reason_of(result: Result<impl std::fmt::Debug, Error>) -> String {
    match result {
        Err(Error::ValidationError { reason, .. }) => reason,
        other => panic!("expected ValidationError, got {:?}", other),
    }
}

#[test]
fn test_valid_manifest_keeps_workflow_order() {
    let manifest = parse(
        r#"{"run_id":"run_01","timestamp":"2026-03-01T08:00:00Z","workflows":["metatdenovo","MAG"],
            "samplesheet_mag.csv":"run_01/samplesheet_mag.csv",
            "samplesheet_metatdenovo.csv":"s3://input-bucket/run_01/samplesheet_metatdenovo.csv",
            "notes":"ignored"}"#,
    );

    let validated = validate(&manifest, &location("run_01/run_manifest.json")).unwrap();

    assert_eq!(validated.run_id, "run_01");
    assert_eq!(validated.workflows().map(|w| w.as_str()).collect::<Vec<_>>(), vec!["metatdenovo", "mag"]);
    assert_eq!(validated.entries[0].samplesheet_key, "run_01/samplesheet_metatdenovo.csv");
    assert_eq!(validated.entries[1].samplesheet_key, "run_01/samplesheet_mag.csv");
    assert_eq!(validated.entries[1].params_key, None);
}

#[test]
fn test_legacy_job_name_is_accepted() {
    let manifest = parse(r#"{"job_name":"run_01","workflows":["mag"],"samplesheet_mag.csv":"samplesheet_mag.csv"}"#);
    let validated = validate(&manifest, &location("run_01/run_manifest.json")).unwrap();
    assert_eq!(validated.run_id, "run_01");
}

#[test]
fn test_empty_workflows_rejected() {
    let manifest = parse(r#"{"run_id":"run_01","workflows":[]}"#);
    let reason = reason_of(validate(&manifest, &location("run_01/run_manifest.json")));
    assert!(reason.contains("empty"), "{}", reason);
}

#[test]
fn test_run_id_must_match_prefix() {
    let manifest = parse(r#"{"run_id":"run_02","workflows":["mag"],"samplesheet_mag.csv":"samplesheet_mag.csv"}"#);
    let reason = reason_of(validate(&manifest, &location("run_01/run_manifest.json")));
    assert!(reason.contains("run_01"), "{}", reason);

    let top_level = validate(&manifest, &location("run_manifest.json"));
    assert!(matches!(top_level, Err(Error::ValidationError { .. })));
}

#[test]
fn test_duplicate_workflows_rejected() {
    let duplicate = parse(
        r#"{"run_id":"run_01","workflows":["mag","Mag"],"samplesheet_mag.csv":"samplesheet_mag.csv"}"#,
    );
    assert!(reason_of(validate(&duplicate, &location("run_01/run_manifest.json"))).contains("more than once"));
}

#[test]
fn test_unconfigured_workflow_passes_validation() {
    let manifest = parse(
        r#"{"run_id":"run_01","workflows":["mag","rnaseq"],
            "samplesheet_mag.csv":"samplesheet_mag.csv","samplesheet_rnaseq.csv":"samplesheet_rnaseq.csv"}"#,
    );

    let validated = validate(&manifest, &location("run_01/run_manifest.json")).unwrap();

    assert_eq!(validated.workflows().map(|w| w.as_str()).collect::<Vec<_>>(), vec!["mag", "rnaseq"]);
    assert_eq!(validated.entries[1].samplesheet_key, "run_01/samplesheet_rnaseq.csv");
}

#[test]
fn test_missing_or_foreign_samplesheet_rejected() {
    let missing = parse(r#"{"run_id":"run_01","workflows":["mag"],"samplesheet_mag.csv":""}"#);
    assert!(reason_of(validate(&missing, &location("run_01/run_manifest.json"))).contains("samplesheet_mag.csv"));

    let foreign = parse(r#"{"run_id":"run_01","workflows":["mag"],"samplesheet_mag.csv":"s3://elsewhere/run_01/samplesheet_mag.csv"}"#);
    assert!(reason_of(validate(&foreign, &location("run_01/run_manifest.json"))).contains("elsewhere"));
}

#[test]
fn test_built_manifest_round_trips_in_order() {
    let workflows = vec![WorkflowName::new("mag"), WorkflowName::new("metatdenovo")];
    let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();

    let manifest = build_manifest("run_01", &workflows, &[WorkflowName::new("mag")], created_at);
    let json = serde_json::to_string(&manifest).unwrap();

    assert_eq!(
        json,
        concat!(
            r#"{"run_id":"run_01","timestamp":"2026-03-01T08:00:00Z","workflows":["mag","metatdenovo"],"#,
            r#""samplesheet_mag.csv":"run_01/samplesheet_mag.csv","samplesheet_metatdenovo.csv":"run_01/samplesheet_metatdenovo.csv","#,
            r#""params_mag.json":"run_01/params_mag.json"}"#
        )
    );

    let back: RunManifestDto = parse(&json);
    assert_eq!(back, manifest);

    let validated = validate(&back, &location("run_01/run_manifest.json")).unwrap();
    assert_eq!(validated.run_id, "run_01");
    assert_eq!(validated.timestamp.as_deref(), Some("2026-03-01T08:00:00Z"));
    let entries: Vec<_> = validated
        .entries
        .iter()
        .map(|e| (e.workflow.as_str(), e.samplesheet_key.as_str(), e.params_key.as_deref()))
        .collect();
    assert_eq!(
        entries,
        vec![
            ("mag", "run_01/samplesheet_mag.csv", Some("run_01/params_mag.json")),
            ("metatdenovo", "run_01/samplesheet_metatdenovo.csv", None),
        ]
    );
}
