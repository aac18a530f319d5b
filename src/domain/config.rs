use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::api::config_dto::{DispatcherConfigDto, WorkflowTargetDto};
use crate::domain::utils::id::{OmicsWorkflowId, WorkflowName};
use crate::domain::utils::retry::RetryPolicy;
use crate::error::{Error, Result};

/// Validated configuration handed to the dispatcher, guard and reporters at
/// construction time.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub input_bucket: String,
    pub output_bucket: String,
    pub output_prefix: Option<String>,
    pub role_arn: String,
    pub run_group_id: Option<String>,
    pub cache_id: Option<String>,
    pub region: Option<String>,
    pub call_timeout: Duration,
    pub dispatch_concurrency: usize,
    pub verify_reads: bool,
    pub catalog: WorkflowCatalog,
    pub upload_retry: RetryPolicy,
}

impl TryFrom<DispatcherConfigDto> for DispatcherConfig {
    type Error = Error;

    fn try_from(dto: DispatcherConfigDto) -> Result<Self> {
        require_non_empty("inputBucket", &dto.input_bucket)?;
        require_non_empty("outputBucket", &dto.output_bucket)?;
        require_non_empty("roleArn", &dto.role_arn)?;

        if dto.call_timeout_secs == 0 {
            return Err(Error::ConfigError("callTimeoutSecs must be greater than 0".to_string()));
        }
        if dto.dispatch_concurrency == 0 {
            return Err(Error::ConfigError("dispatchConcurrency must be at least 1".to_string()));
        }

        let upload_retry = RetryPolicy::try_from(&dto.upload_retry)?;
        let catalog = WorkflowCatalog::from_dtos(&dto.workflows)?;

        Ok(DispatcherConfig {
            input_bucket: dto.input_bucket,
            output_bucket: dto.output_bucket,
            output_prefix: dto.output_prefix.map(|p| p.trim_matches('/').to_string()).filter(|p| !p.is_empty()),
            role_arn: dto.role_arn,
            run_group_id: dto.run_group_id.filter(|s| !s.is_empty()),
            cache_id: dto.cache_id.filter(|s| !s.is_empty()),
            region: dto.region.filter(|s| !s.is_empty()),
            call_timeout: Duration::from_secs(dto.call_timeout_secs),
            dispatch_concurrency: dto.dispatch_concurrency,
            verify_reads: dto.verify_reads,
            catalog,
            upload_retry,
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::ConfigError(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// The workflows a manifest may request, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    targets: BTreeMap<WorkflowName, WorkflowTarget>,
}

impl WorkflowCatalog {
    pub fn from_dtos(dtos: &[WorkflowTargetDto]) -> Result<Self> {
        if dtos.is_empty() {
            return Err(Error::ConfigError("at least one workflow must be configured".to_string()));
        }
        let mut catalog = WorkflowCatalog::default();
        for dto in dtos {
            catalog.insert(WorkflowTarget::try_from(dto)?)?;
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, target: WorkflowTarget) -> Result<()> {
        if self.targets.contains_key(&target.name) {
            return Err(Error::ConfigError(format!("workflow '{}' is configured twice", target.name)));
        }
        self.targets.insert(target.name.clone(), target);
        Ok(())
    }

    pub fn get(&self, name: &WorkflowName) -> Option<&WorkflowTarget> {
        self.targets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(&WorkflowName::new(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &WorkflowName> {
        self.targets.keys()
    }
}

/// Where a workflow name is started in HealthOmics, and with which parameters.
#[derive(Debug, Clone)]
pub struct WorkflowTarget {
    pub name: WorkflowName,
    pub workflow_id: OmicsWorkflowId,
    pub version_name: Option<String>,
    pub template: ParameterTemplate,
}

impl WorkflowTarget {
    pub fn new(name: &str, workflow_id: &str) -> Result<Self> {
        let name = normalize_workflow_name(name)?;
        let workflow_id = workflow_id_from_arn(workflow_id);
        if workflow_id.is_empty() {
            return Err(Error::ConfigError(format!("workflow '{}' has an empty workflowId", name)));
        }
        Ok(WorkflowTarget {
            name: WorkflowName::new(name),
            workflow_id: OmicsWorkflowId::new(workflow_id),
            version_name: None,
            template: ParameterTemplate::default(),
        })
    }
}

impl TryFrom<&WorkflowTargetDto> for WorkflowTarget {
    type Error = Error;

    fn try_from(dto: &WorkflowTargetDto) -> Result<Self> {
        let mut target = WorkflowTarget::new(&dto.name, &dto.workflow_id)?;
        target.version_name = dto.version_name.clone().filter(|v| !v.is_empty());
        if let Some(template) = &dto.parameter_template {
            target.template = ParameterTemplate::new(template.clone())
                .map_err(|reason| Error::ConfigError(format!("workflow '{}': {}", target.name, reason)))?;
        }
        Ok(target)
    }
}

/// Lowercases and checks a workflow name: ASCII letters, digits, `-` and `_` only.
pub fn normalize_workflow_name(name: &str) -> Result<String> {
    let name = name.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(Error::ConfigError("workflow name must not be empty".to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(Error::ConfigError(format!("workflow name '{}' contains unsupported characters", name)));
    }
    Ok(name)
}

/// `arn:aws:omics:us-east-1:123:workflow/1234567` -> `1234567`; plain ids pass through.
pub fn workflow_id_from_arn(value: &str) -> String {
    let value = value.trim();
    if value.starts_with("arn:") {
        value.rsplit('/').next().unwrap_or(value).to_string()
    } else {
        value.to_string()
    }
}

/// Values substituted into a [`ParameterTemplate`].
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub run_id: &'a str,
    pub workflow: &'a str,
    pub samplesheet: &'a str,
    pub outdir: &'a str,
    pub params: Option<&'a str>,
}

/// JSON object whose string leaves may reference `{run_id}`, `{workflow}`,
/// `{samplesheet}`, `{outdir}` and `{params}`.
///
/// A leaf referencing `{params}` is dropped when the manifest declares no
/// parameter file for the workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTemplate {
    root: Map<String, Value>,
}

impl ParameterTemplate {
    pub fn new(template: Value) -> std::result::Result<Self, String> {
        match template {
            Value::Object(root) => Ok(ParameterTemplate { root }),
            other => Err(format!("parameterTemplate must be a JSON object, got {}", other)),
        }
    }

    pub fn render(&self, ctx: &TemplateContext<'_>) -> Value {
        Value::Object(render_object(&self.root, ctx))
    }
}

impl Default for ParameterTemplate {
    fn default() -> Self {
        let template = json!({
            "input": "{samplesheet}",
            "outdir": "{outdir}",
            "params": "{params}",
        });
        match template {
            Value::Object(root) => ParameterTemplate { root },
            _ => unreachable!("json! object literal"),
        }
    }
}

fn render_object(object: &Map<String, Value>, ctx: &TemplateContext<'_>) -> Map<String, Value> {
    object.iter().filter_map(|(k, v)| render_value(v, ctx).map(|v| (k.clone(), v))).collect()
}

fn render_value(value: &Value, ctx: &TemplateContext<'_>) -> Option<Value> {
    match value {
        Value::String(s) => render_string(s, ctx).map(Value::String),
        Value::Array(items) => Some(Value::Array(items.iter().filter_map(|v| render_value(v, ctx)).collect())),
        Value::Object(object) => Some(Value::Object(render_object(object, ctx))),
        other => Some(other.clone()),
    }
}

fn render_string(s: &str, ctx: &TemplateContext<'_>) -> Option<String> {
    let mut rendered = s
        .replace("{run_id}", ctx.run_id)
        .replace("{workflow}", ctx.workflow)
        .replace("{samplesheet}", ctx.samplesheet)
        .replace("{outdir}", ctx.outdir);
    if rendered.contains("{params}") {
        rendered = rendered.replace("{params}", ctx.params?);
    }
    Some(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(params: Option<&str>) -> TemplateContext<'_> {
        TemplateContext {
            run_id: "run_01",
            workflow: "mag",
            samplesheet: "s3://in/run_01/samplesheet_mag.csv",
            outdir: "s3://out/run_01/mag/",
            params,
        }
    }

    #[test]
    fn default_template_omits_params_when_absent() {
        let rendered = ParameterTemplate::default().render(&ctx(None));
        assert_eq!(rendered, json!({"input": "s3://in/run_01/samplesheet_mag.csv", "outdir": "s3://out/run_01/mag/"}));
    }

    #[test]
    fn default_template_includes_params_when_declared() {
        let rendered = ParameterTemplate::default().render(&ctx(Some("s3://in/run_01/params_mag.json")));
        assert_eq!(rendered["params"], "s3://in/run_01/params_mag.json");
    }

    #[test]
    fn custom_template_substitutes_nested_values() {
        let template = ParameterTemplate::new(json!({
            "input": "{samplesheet}",
            "skip_binning": true,
            "labels": ["{run_id}", "{workflow}"],
            "publish": {"dir": "{outdir}reports/"}
        }))
        .unwrap();

        let rendered = template.render(&ctx(None));
        assert_eq!(rendered["skip_binning"], true);
        assert_eq!(rendered["labels"], json!(["run_01", "mag"]));
        assert_eq!(rendered["publish"]["dir"], "s3://out/run_01/mag/reports/");
    }

    #[test]
    fn template_must_be_an_object() {
        assert!(ParameterTemplate::new(json!(["input"])).is_err());
    }

    #[test]
    fn strips_workflow_arn_to_id() {
        assert_eq!(workflow_id_from_arn("arn:aws:omics:us-east-1:123:workflow/9876543"), "9876543");
        assert_eq!(workflow_id_from_arn("9876543"), "9876543");
    }

    #[test]
    fn workflow_names_are_lowercased_and_checked() {
        assert_eq!(normalize_workflow_name(" MAG ").unwrap(), "mag");
        assert!(normalize_workflow_name("mag/1").is_err());
        assert!(normalize_workflow_name("").is_err());
    }
}
