//! Setup and options flows
//!
//! The setup flow asks for an API key, checks it against the service and
//! creates the entry. The options flow sends a single test entry and changes
//! nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use ha_config_entries::{
    FlowContext, FlowError, FlowHandler, FlowResult, FormField, ABORT_ALREADY_CONFIGURED,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::api::MyLogApi;
use crate::constants::{
    API_KEY_PREFIX, CONF_API_KEY, DEFAULT_TEST_CONTENT, DEFAULT_TEST_TITLE, ENTRY_TITLE,
    MYLOG_URL, TEST_TAGS,
};
use crate::error::MyLogError;
use crate::models::{LogEntryRequest, Severity};

pub const STEP_USER: &str = "user";
pub const STEP_INIT: &str = "init";

pub const ERROR_INVALID_API_KEY_FORMAT: &str = "invalid_api_key_format";
pub const ERROR_INVALID_AUTH: &str = "invalid_auth";
pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";
pub const ERROR_UNKNOWN: &str = "unknown";

pub const ABORT_TEST_MESSAGE_SENT: &str = "test_message_sent";
pub const ABORT_ENTRY_NOT_FOUND: &str = "entry_not_found";

/// Form error code for a failed API call
pub fn error_code(err: &MyLogError) -> &'static str {
    match err {
        MyLogError::Auth(_) => ERROR_INVALID_AUTH,
        MyLogError::Connection(_) => ERROR_CANNOT_CONNECT,
        MyLogError::Api(_) => ERROR_UNKNOWN,
    }
}

fn base_error(code: &str) -> HashMap<String, String> {
    HashMap::from([("base".to_string(), code.to_string())])
}

fn unknown_step(context: &FlowContext, step_id: &str) -> FlowError {
    FlowError::UnknownStep {
        handler: context.handler().to_string(),
        step: step_id.to_string(),
    }
}

fn input_str<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str)
}

/// Adds a MyLog account
pub struct MyLogConfigFlow {
    api_url: String,
}

impl MyLogConfigFlow {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }

    fn form(&self, context: &FlowContext, errors: HashMap<String, String>) -> FlowResult {
        context.show_form(
            STEP_USER,
            vec![FormField::required(CONF_API_KEY, "string")],
            errors,
            HashMap::from([("mylog_url".to_string(), MYLOG_URL.to_string())]),
        )
    }
}

#[async_trait]
impl FlowHandler for MyLogConfigFlow {
    async fn async_step(
        &mut self,
        step_id: &str,
        user_input: Option<Value>,
        context: &mut FlowContext,
    ) -> Result<FlowResult, FlowError> {
        if step_id != STEP_USER {
            return Err(unknown_step(context, step_id));
        }

        let Some(input) = user_input else {
            return Ok(self.form(context, HashMap::new()));
        };

        let api_key = input_str(&input, CONF_API_KEY).unwrap_or_default().trim();
        if !api_key.starts_with(API_KEY_PREFIX) {
            return Ok(self.form(context, base_error(ERROR_INVALID_API_KEY_FORMAT)));
        }

        context.set_unique_id(api_key);
        if context.is_unique_id_configured() {
            return Ok(context.abort(ABORT_ALREADY_CONFIGURED));
        }

        let api = MyLogApi::with_api_url(api_key, &self.api_url);
        let checked = api.health_check().await;
        api.close();

        match checked {
            Ok(_) => {
                let data = HashMap::from([(CONF_API_KEY.to_string(), json!(api_key))]);
                Ok(context.create_entry(ENTRY_TITLE, data))
            }
            Err(err) => {
                debug!("API key check failed: {}", err);
                Ok(self.form(context, base_error(error_code(&err))))
            }
        }
    }
}

/// Sends a test entry from an existing account
pub struct MyLogOptionsFlow {
    api_url: String,
}

impl MyLogOptionsFlow {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }

    fn form(context: &FlowContext, errors: HashMap<String, String>) -> FlowResult {
        context.show_form(
            STEP_INIT,
            vec![
                FormField::optional("title", "string", Some(json!(DEFAULT_TEST_TITLE))),
                FormField::optional("content", "string", Some(json!(DEFAULT_TEST_CONTENT))),
            ],
            errors,
            HashMap::new(),
        )
    }
}

#[async_trait]
impl FlowHandler for MyLogOptionsFlow {
    fn init_step(&self) -> &'static str {
        STEP_INIT
    }

    async fn async_step(
        &mut self,
        step_id: &str,
        user_input: Option<Value>,
        context: &mut FlowContext,
    ) -> Result<FlowResult, FlowError> {
        if step_id != STEP_INIT {
            return Err(unknown_step(context, step_id));
        }

        let Some(input) = user_input else {
            return Ok(Self::form(context, HashMap::new()));
        };

        let Some(entry) = context.config_entry() else {
            return Ok(context.abort(ABORT_ENTRY_NOT_FOUND));
        };
        let api_key = entry.data_str(CONF_API_KEY).unwrap_or_default();

        let request = LogEntryRequest {
            title: Some(input_str(&input, "title").unwrap_or(DEFAULT_TEST_TITLE).to_string()),
            content: Some(
                input_str(&input, "content")
                    .unwrap_or(DEFAULT_TEST_CONTENT)
                    .to_string(),
            ),
            severity: Some(Severity::Info),
            priority: Some(0),
            tags: Some(TEST_TAGS.iter().map(|tag| tag.to_string()).collect()),
            ..Default::default()
        };

        let api = MyLogApi::with_api_url(api_key, &self.api_url);
        let sent = api.create_log_entry(&request).await;
        api.close();

        match sent {
            Ok(_) => Ok(context.abort(ABORT_TEST_MESSAGE_SENT)),
            Err(err) => {
                debug!(entry_id = %entry.entry_id, "Test message failed: {}", err);
                Ok(Self::form(context, base_error(error_code(&err))))
            }
        }
    }
}
