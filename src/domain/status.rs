use std::fmt;
use std::sync::Arc;

use crate::domain::dispatcher::run_name;
use crate::domain::omics::api::{OmicsApi, RunDetails};
use crate::domain::utils::id::{OmicsRunId, RunId, WorkflowName};
use crate::domain::utils::s3_uri::S3Uri;
use crate::error::Result;

const SUBJECT_MAX_CHARS: usize = 100;

/// `arn:aws:omics:eu-west-1:123:run/456` -> `eu-west-1`.
pub fn region_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(3).filter(|region| !region.is_empty())
}

/// Human-readable status of one run: a short subject line and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub subject: String,
    pub body: String,
}

impl StatusReport {
    pub fn render(details: &RunDetails) -> Self {
        let workflow = details.tags.get("workflow").map(String::as_str).unwrap_or("unknown");
        let run_id = details.tags.get("run_id").map(String::as_str);
        let status = details.status.as_deref().unwrap_or("UNKNOWN");
        let region = details.arn.as_deref().and_then(region_from_arn);
        let param = |name: &str| details.parameters.get(name).and_then(|v| v.as_str()).map(str::to_string);
        let or_na = |value: Option<&str>| value.unwrap_or("n/a").to_string();

        let subject: String =
            format!("[{}] {} - {}", workflow.to_uppercase(), status, details.omics_run_id).chars().take(SUBJECT_MAX_CHARS).collect();

        let input = param("input");
        let outdir = param("outdir").or_else(|| details.output_uri.clone());
        let mut lines = vec![
            "AWS HealthOmics Workflow Status".to_string(),
            "===============================".to_string(),
            String::new(),
            format!("Workflow:       {}", workflow),
            format!("Run ID:         {}", or_na(run_id)),
            format!("Run Name:       {}", or_na(details.name.as_deref())),
            format!("Omics Run ARN:  {}", or_na(details.arn.as_deref())),
            format!("Omics Run ID:   {}", details.omics_run_id),
            format!("Status:         {}", status),
            format!("Started:        {}", or_na(details.start_time.as_deref())),
            format!("Finished:       {}", or_na(details.stop_time.as_deref())),
            format!("Message:        {}", or_na(details.status_message.as_deref())),
            String::new(),
            "IO Context:".to_string(),
            format!("- Input:            {}", or_na(input.as_deref())),
            format!("- Params JSON:      {}", or_na(param("params").as_deref())),
            format!("- Output (outdir):  {}", or_na(outdir.as_deref())),
        ];

        if let Some(region) = region {
            lines.push(String::new());
            lines.push("Useful Links:".to_string());
            lines.push(format!(
                "- Omics Run: https://console.aws.amazon.com/omics/home?region={}#/runs/{}",
                region, details.omics_run_id
            ));
            for (label, uri) in [("Input S3: ", input.as_deref()), ("Output S3:", outdir.as_deref())] {
                if let Some(uri) = uri.and_then(S3Uri::parse) {
                    let prefix = uri.key.rsplit_once('/').map(|(dir, _)| format!("{}/", dir)).unwrap_or_default();
                    lines.push(format!(
                        "- {} https://s3.console.aws.amazon.com/s3/buckets/{}?prefix={}&region={}",
                        label, uri.bucket, prefix, region
                    ));
                }
            }
        }

        StatusReport { subject, body: lines.join("\n") }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.subject)?;
        writeln!(f)?;
        write!(f, "{}", self.body)
    }
}

/// Read path over dispatched runs.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    omics: Arc<dyn OmicsApi>,
}

impl StatusReporter {
    pub fn new(omics: Arc<dyn OmicsApi>) -> Self {
        StatusReporter { omics }
    }

    pub async fn run_status(&self, omics_run_id: &OmicsRunId) -> Result<StatusReport> {
        let details = self.omics.get_run(omics_run_id).await?;
        Ok(StatusReport::render(&details))
    }

    /// Latest run of each workflow for a submission; `None` where nothing was dispatched.
    pub async fn runs_for<'a>(
        &self,
        run_id: &RunId,
        workflows: impl IntoIterator<Item = &'a WorkflowName>,
    ) -> Result<Vec<(WorkflowName, Option<StatusReport>)>> {
        let mut reports = Vec::new();
        for workflow in workflows {
            let latest = self.omics.list_runs_by_name(&run_name(run_id, workflow)).await?.into_iter().next();
            let report = match latest {
                Some(handle) => Some(self.run_status(&handle.omics_run_id).await?),
                None => None,
            };
            reports.push((workflow.clone(), report));
        }
        Ok(reports)
    }
}
