use url::form_urlencoded;

use crate::api::s3_event_dto::S3EventDto;
use crate::domain::dispatcher::Dispatcher;
use crate::domain::dispatcher::report::DispatchReport;
use crate::domain::manifest::{MANIFEST_FILE_NAME, ManifestLocation};
use crate::error::Result;

/// Notification keys arrive form-encoded (`run%2001/...`, `+` for space).
pub fn decode_object_key(raw: &str) -> String {
    form_urlencoded::parse(format!("k={}", raw).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| raw.to_string())
}

/// Manifest objects named by an event, in record order. Everything else the
/// bucket notifies about (reads, samplesheets) is dropped here.
pub fn manifest_locations(event: &S3EventDto) -> Vec<ManifestLocation> {
    event
        .records
        .iter()
        .map(|record| ManifestLocation::new(&record.s3.bucket.name, decode_object_key(&record.s3.object.key)))
        .filter(|location| location.key.rsplit('/').next() == Some(MANIFEST_FILE_NAME))
        .collect()
}

/// Outcome of one manifest record.
#[derive(Debug)]
pub struct TriggerOutcome {
    pub location: ManifestLocation,
    pub report: Result<DispatchReport>,
}

/// Feeds every manifest record of an event through the dispatcher, one at a time.
pub async fn handle_event(dispatcher: &Dispatcher, event: &S3EventDto) -> Vec<TriggerOutcome> {
    let locations = manifest_locations(event);
    if locations.is_empty() {
        log::info!("Event with {} record(s) names no {}, ignoring", event.records.len(), MANIFEST_FILE_NAME);
    }

    let mut outcomes = Vec::with_capacity(locations.len());
    for location in locations {
        let report = dispatcher.process_manifest(&location).await;
        if let Err(e) = &report {
            log::error!("Manifest {} not dispatched: {}", location, e);
        }
        outcomes.push(TriggerOutcome { location, report });
    }
    outcomes
}
