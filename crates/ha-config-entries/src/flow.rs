//! Data entry flows
//!
//! A flow is a small step machine that collects user input through forms.
//! Config flows end by creating a new entry; options flows end by replacing
//! an existing entry's options. Either kind may abort instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::manager::{ConfigEntries, ConfigEntriesError};

/// Abort reason used when an entry with the flow's unique id already exists
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Flow not found: {0}")]
    NotFound(String),

    #[error("Unknown integration: {0}")]
    UnknownHandler(String),

    #[error("Integration {0} does not support this flow")]
    NotSupported(String),

    #[error("Unknown step {step} for {handler}")]
    UnknownStep { handler: String, step: String },

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

/// Outcome of a flow step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResultType {
    Form,
    CreateEntry,
    Abort,
}

/// Result of a flow step, in the shape the frontend expects
#[derive(Debug, Clone, Serialize)]
pub struct FlowResult {
    pub flow_id: String,
    /// Integration domain
    pub handler: String,
    #[serde(rename = "type")]
    pub result_type: FlowResultType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Always present, empty if no schema
    pub data_schema: Vec<FormField>,
    /// Errors from the previous submission (null if none)
    pub errors: Option<HashMap<String, String>>,
    pub description_placeholders: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
    /// Entry id created by a config flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl FlowResult {
    fn new(context: &FlowContext, result_type: FlowResultType) -> Self {
        Self {
            flow_id: context.flow_id.clone(),
            handler: context.handler.clone(),
            result_type,
            step_id: None,
            data_schema: Vec::new(),
            errors: None,
            description_placeholders: None,
            title: None,
            reason: None,
            data: None,
            result: None,
        }
    }

    /// The form-level ("base") error code, if any
    pub fn base_error(&self) -> Option<&str> {
        self.errors
            .as_ref()
            .and_then(|e| e.get("base"))
            .map(String::as_str)
    }
}

/// Form field schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FormField {
    pub fn required(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: Some(true),
            default: None,
        }
    }

    pub fn optional(
        name: impl Into<String>,
        field_type: impl Into<String>,
        default: Option<serde_json::Value>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: Some(false),
            default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlowKind {
    Config,
    Options { entry_id: String },
}

/// What a step can see and do besides its own state
pub struct FlowContext {
    flow_id: String,
    handler: String,
    kind: FlowKind,
    unique_id: Option<String>,
    entries: Arc<ConfigEntries>,
}

impl FlowContext {
    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// Entry being edited by an options flow
    pub fn config_entry(&self) -> Option<ConfigEntry> {
        match &self.kind {
            FlowKind::Options { entry_id } => self.entries.get(entry_id),
            FlowKind::Config => None,
        }
    }

    /// Unique id given to the entry this flow creates
    pub fn set_unique_id(&mut self, unique_id: impl Into<String>) {
        self.unique_id = Some(unique_id.into());
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.unique_id.as_deref()
    }

    /// Whether an entry of this domain already has the flow's unique id
    pub fn is_unique_id_configured(&self) -> bool {
        self.unique_id
            .as_deref()
            .map(|id| self.entries.get_by_unique_id(&self.handler, id).is_some())
            .unwrap_or(false)
    }

    pub fn show_form(
        &self,
        step_id: impl Into<String>,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
        description_placeholders: HashMap<String, String>,
    ) -> FlowResult {
        FlowResult {
            step_id: Some(step_id.into()),
            data_schema,
            errors: (!errors.is_empty()).then_some(errors),
            description_placeholders: (!description_placeholders.is_empty())
                .then_some(description_placeholders),
            ..FlowResult::new(self, FlowResultType::Form)
        }
    }

    pub fn create_entry(
        &self,
        title: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> FlowResult {
        FlowResult {
            title: Some(title.into()),
            data: Some(data),
            ..FlowResult::new(self, FlowResultType::CreateEntry)
        }
    }

    pub fn abort(&self, reason: impl Into<String>) -> FlowResult {
        FlowResult {
            reason: Some(reason.into()),
            ..FlowResult::new(self, FlowResultType::Abort)
        }
    }
}

/// One running flow's step logic
#[async_trait]
pub trait FlowHandler: Send + Sync {
    /// Step run when the flow starts
    fn init_step(&self) -> &'static str {
        "user"
    }

    /// Run `step_id`; `user_input` is `None` the first time a form is shown
    async fn async_step(
        &mut self,
        step_id: &str,
        user_input: Option<serde_json::Value>,
        context: &mut FlowContext,
    ) -> Result<FlowResult, FlowError>;
}

struct ActiveFlow {
    handler: Box<dyn FlowHandler>,
    context: FlowContext,
    step_id: String,
}

/// Tracks in-progress flows and applies their final results
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    flows: DashMap<String, ActiveFlow>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            flows: DashMap::new(),
        }
    }

    /// Start a config flow for an integration domain
    pub async fn start_flow(&self, domain: &str) -> Result<FlowResult, FlowError> {
        let integration = self
            .entries
            .integration(domain)
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))?;
        let handler = integration
            .config_flow()
            .ok_or_else(|| FlowError::NotSupported(domain.to_string()))?;

        self.begin(handler, domain, FlowKind::Config).await
    }

    /// Start an options flow for an existing entry
    pub async fn start_options_flow(&self, entry_id: &str) -> Result<FlowResult, FlowError> {
        let entry = self
            .entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        let integration = self
            .entries
            .integration(&entry.domain)
            .ok_or_else(|| FlowError::UnknownHandler(entry.domain.clone()))?;
        let handler = integration
            .options_flow(&entry)
            .ok_or_else(|| FlowError::NotSupported(entry.domain.clone()))?;

        let kind = FlowKind::Options {
            entry_id: entry.entry_id.clone(),
        };
        self.begin(handler, &entry.domain, kind).await
    }

    async fn begin(
        &self,
        handler: Box<dyn FlowHandler>,
        domain: &str,
        kind: FlowKind,
    ) -> Result<FlowResult, FlowError> {
        let step_id = handler.init_step().to_string();
        let flow = ActiveFlow {
            handler,
            context: FlowContext {
                flow_id: Ulid::new().to_string(),
                handler: domain.to_string(),
                kind,
                unique_id: None,
                entries: self.entries.clone(),
            },
            step_id: step_id.clone(),
        };

        debug!(flow_id = %flow.context.flow_id, handler = %domain, "Starting flow");
        self.run_step(flow, step_id, None).await
    }

    /// Submit user input to the flow's current step
    pub async fn progress_flow(
        &self,
        flow_id: &str,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        // Taken out of the map for the duration of the step so a slow step
        // never holds a shard lock.
        let (_, flow) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::NotFound(flow_id.to_string()))?;

        let step_id = flow.step_id.clone();
        self.run_step(flow, step_id, user_input).await
    }

    async fn run_step(
        &self,
        mut flow: ActiveFlow,
        step_id: String,
        user_input: Option<serde_json::Value>,
    ) -> Result<FlowResult, FlowError> {
        let mut result = flow
            .handler
            .async_step(&step_id, user_input, &mut flow.context)
            .await?;

        match result.result_type {
            FlowResultType::Form => {
                flow.step_id = result.step_id.clone().unwrap_or(step_id);
                self.flows.insert(flow.context.flow_id.clone(), flow);
            }
            FlowResultType::CreateEntry => {
                result = self.finish(&flow.context, result).await?;
            }
            FlowResultType::Abort => {
                debug!(
                    flow_id = %flow.context.flow_id,
                    reason = ?result.reason,
                    "Flow aborted"
                );
            }
        }

        Ok(result)
    }

    async fn finish(
        &self,
        context: &FlowContext,
        mut result: FlowResult,
    ) -> Result<FlowResult, FlowError> {
        let data = result.data.clone().unwrap_or_default();

        match &context.kind {
            FlowKind::Config => {
                let title = result.title.clone().unwrap_or_else(|| context.handler.clone());
                let mut entry = ConfigEntry::new(&context.handler, title).with_data(data);
                entry.unique_id = context.unique_id.clone();

                let entry = match self.entries.add(entry).await {
                    Ok(entry) => entry,
                    Err(ConfigEntriesError::AlreadyExists { .. }) => {
                        return Ok(context.abort(ABORT_ALREADY_CONFIGURED));
                    }
                    Err(e) => return Err(e.into()),
                };

                // The entry exists either way; a failed setup is visible in its state.
                if let Err(e) = self.entries.setup(&entry.entry_id).await {
                    warn!("Setup of new entry {} failed: {}", entry.entry_id, e);
                }

                info!(handler = %context.handler, entry_id = %entry.entry_id, "Flow created entry");
                result.result = Some(entry.entry_id);
            }
            FlowKind::Options { entry_id } => {
                self.entries
                    .update(entry_id, ConfigEntryUpdate::new().options(data))
                    .await?;
                debug!(entry_id = %entry_id, "Options flow updated entry");
            }
        }

        Ok(result)
    }

    /// Abort a flow that is waiting for input
    pub fn abort_flow(&self, flow_id: &str) -> Result<(), FlowError> {
        self.flows
            .remove(flow_id)
            .map(|_| ())
            .ok_or_else(|| FlowError::NotFound(flow_id.to_string()))
    }

    /// Summaries of flows waiting for input
    pub fn list_flows(&self) -> Vec<serde_json::Value> {
        self.flows
            .iter()
            .map(|flow| {
                json!({
                    "flow_id": flow.context.flow_id,
                    "handler": flow.context.handler,
                    "step_id": flow.step_id,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{Integration, SetupError};
    use crate::storage::Storage;
    use tempfile::TempDir;

    /// Asks for a name, uses it as unique id, and stores it
    struct NameFlow;

    #[async_trait]
    impl FlowHandler for NameFlow {
        async fn async_step(
            &mut self,
            step_id: &str,
            user_input: Option<serde_json::Value>,
            context: &mut FlowContext,
        ) -> Result<FlowResult, FlowError> {
            if step_id != "user" {
                return Err(FlowError::UnknownStep {
                    handler: context.handler().to_string(),
                    step: step_id.to_string(),
                });
            }

            let mut errors = HashMap::new();
            if let Some(input) = user_input {
                let name = input["name"].as_str().unwrap_or_default().to_string();
                if name.is_empty() {
                    errors.insert("base".to_string(), "empty_name".to_string());
                } else {
                    context.set_unique_id(name.clone());
                    if context.is_unique_id_configured() {
                        return Ok(context.abort(ABORT_ALREADY_CONFIGURED));
                    }
                    let mut data = HashMap::new();
                    data.insert("name".to_string(), json!(name));
                    return Ok(context.create_entry(name, data));
                }
            }

            Ok(context.show_form(
                "user",
                vec![FormField::required("name", "string")],
                errors,
                HashMap::new(),
            ))
        }
    }

    /// Options flow that stores whatever it is given
    struct EchoOptions;

    #[async_trait]
    impl FlowHandler for EchoOptions {
        fn init_step(&self) -> &'static str {
            "init"
        }

        async fn async_step(
            &mut self,
            _step_id: &str,
            user_input: Option<serde_json::Value>,
            context: &mut FlowContext,
        ) -> Result<FlowResult, FlowError> {
            match user_input {
                None => Ok(context.show_form("init", Vec::new(), HashMap::new(), HashMap::new())),
                Some(input) => {
                    let data = serde_json::from_value(input).unwrap_or_default();
                    Ok(context.create_entry("", data))
                }
            }
        }
    }

    struct Named;

    #[async_trait]
    impl Integration for Named {
        fn domain(&self) -> &str {
            "named"
        }

        async fn setup_entry(&self, _entry: &ConfigEntry) -> Result<(), SetupError> {
            Ok(())
        }

        async fn unload_entry(&self, _entry: &ConfigEntry) -> Result<(), SetupError> {
            Ok(())
        }

        fn config_flow(&self) -> Option<Box<dyn FlowHandler>> {
            Some(Box::new(NameFlow))
        }

        fn options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn FlowHandler>> {
            Some(Box::new(EchoOptions))
        }
    }

    fn manager() -> (TempDir, Arc<ConfigEntries>, FlowManager) {
        let dir = TempDir::new().unwrap();
        let entries = Arc::new(ConfigEntries::new(Arc::new(Storage::new(dir.path()))));
        entries.register_integration(Arc::new(Named));
        let flows = FlowManager::new(entries.clone());
        (dir, entries, flows)
    }

    #[tokio::test]
    async fn test_flow_creates_and_sets_up_entry() {
        let (_dir, entries, flows) = manager();

        let form = flows.start_flow("named").await.unwrap();
        assert_eq!(form.result_type, FlowResultType::Form);
        assert_eq!(form.step_id.as_deref(), Some("user"));
        assert_eq!(flows.list_flows().len(), 1);

        let done = flows
            .progress_flow(&form.flow_id, Some(json!({"name": "kitchen"})))
            .await
            .unwrap();

        assert_eq!(done.result_type, FlowResultType::CreateEntry);
        let entry = entries.get(done.result.as_deref().unwrap()).unwrap();
        assert_eq!(entry.unique_id.as_deref(), Some("kitchen"));
        assert!(entry.is_loaded());
        assert!(flows.list_flows().is_empty());
    }

    #[tokio::test]
    async fn test_form_errors_keep_flow_alive() {
        let (_dir, _entries, flows) = manager();

        let form = flows.start_flow("named").await.unwrap();
        let retry = flows
            .progress_flow(&form.flow_id, Some(json!({"name": ""})))
            .await
            .unwrap();

        assert_eq!(retry.result_type, FlowResultType::Form);
        assert_eq!(retry.base_error(), Some("empty_name"));
        assert_eq!(retry.flow_id, form.flow_id);
        assert_eq!(flows.list_flows().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_aborts() {
        let (_dir, entries, flows) = manager();
        entries
            .add(ConfigEntry::new("named", "kitchen").with_unique_id("kitchen"))
            .await
            .unwrap();

        let form = flows.start_flow("named").await.unwrap();
        let result = flows
            .progress_flow(&form.flow_id, Some(json!({"name": "kitchen"})))
            .await
            .unwrap();

        assert_eq!(result.result_type, FlowResultType::Abort);
        assert_eq!(result.reason.as_deref(), Some(ABORT_ALREADY_CONFIGURED));
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_options_flow_replaces_options() {
        let (_dir, entries, flows) = manager();
        let entry = entries.add(ConfigEntry::new("named", "kitchen")).await.unwrap();

        let form = flows.start_options_flow(&entry.entry_id).await.unwrap();
        assert_eq!(form.step_id.as_deref(), Some("init"));

        flows
            .progress_flow(&form.flow_id, Some(json!({"verbose": true})))
            .await
            .unwrap();

        let entry = entries.get(&entry.entry_id).unwrap();
        assert_eq!(entry.options["verbose"], json!(true));
    }

    #[tokio::test]
    async fn test_unknown_flow_and_handler() {
        let (_dir, _entries, flows) = manager();

        assert!(matches!(
            flows.progress_flow("missing", None).await,
            Err(FlowError::NotFound(_))
        ));
        assert!(matches!(
            flows.start_flow("light").await,
            Err(FlowError::UnknownHandler(_))
        ));
        assert!(matches!(
            flows.abort_flow("missing"),
            Err(FlowError::NotFound(_))
        ));
    }
}
