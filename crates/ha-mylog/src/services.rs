//! `mylog.send_log` and `mylog.send_batch`
//!
//! Both services are registered once for the whole process and send through
//! the most recently loaded account.

use std::sync::Arc;

use ha_service_registry::{
    ServiceCall, ServiceDescription, ServiceError, ServiceRegistry, ServiceResult,
    SupportsResponse,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::accounts::Accounts;
use crate::coerce::one_or_many;
use crate::constants::{DOMAIN, SERVICE_SEND_BATCH, SERVICE_SEND_LOG};
use crate::error::MyLogError;
use crate::models::LogEntryRequest;

/// JSON Schema for one log entry
///
/// Scalars are admitted in the loose forms automations produce (`"50"`,
/// `"on"`, `123` for a title); the request deserializer converts them and
/// range-checks the string forms.
pub fn log_entry_schema() -> Value {
    let text = json!({"type": ["string", "number", "boolean"]});
    let flag = json!({"type": ["boolean", "number", "string"]});

    json!({
        "type": "object",
        "properties": {
            "title": text,
            "content": text,
            "type_name": text,
            "type_id": {"type": ["number", "string"], "minimum": 0},
            "severity": {"enum": ["info", "low", "medium", "high", "critical"]},
            "priority": {"type": ["number", "string"], "minimum": 0, "maximum": 100},
            "status": {"enum": ["draft", "active", "archived"]},
            "tags": {
                "anyOf": [
                    text,
                    {"type": "array", "items": text}
                ]
            },
            "location_name": text,
            "location_lat": {"type": ["number", "string"], "minimum": -90, "maximum": 90},
            "location_lng": {"type": ["number", "string"], "minimum": -180, "maximum": 180},
            "occurred_at": text,
            "is_favourite": flag,
            "is_starred": flag,
            "is_pinned": flag,
            "is_public": flag,
            "external_ref_id": text
        },
        "additionalProperties": false
    })
}

/// JSON Schema for `send_batch`
pub fn send_batch_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "entries": {
                "anyOf": [
                    {"type": "array", "minItems": 1, "items": log_entry_schema()},
                    log_entry_schema()
                ]
            }
        },
        "required": ["entries"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct SendBatch {
    #[serde(deserialize_with = "one_or_many")]
    entries: Vec<LogEntryRequest>,
}

/// Register both services, replacing any earlier registration
pub(crate) fn register(
    services: &ServiceRegistry,
    accounts: Arc<Accounts>,
) -> Result<(), ServiceError> {
    let send_log_accounts = accounts.clone();
    services.register_with_description(
        ServiceDescription {
            name: Some("Send log".to_string()),
            description: Some("Create a log entry in MyLog".to_string()),
            schema: Some(log_entry_schema()),
            supports_response: SupportsResponse::Optional,
            ..ServiceDescription::new(DOMAIN, SERVICE_SEND_LOG)
        },
        move |call| send_log(send_log_accounts.clone(), call),
    )?;

    services.register_with_description(
        ServiceDescription {
            name: Some("Send batch".to_string()),
            description: Some("Create several log entries in MyLog at once".to_string()),
            schema: Some(send_batch_schema()),
            supports_response: SupportsResponse::Optional,
            ..ServiceDescription::new(DOMAIN, SERVICE_SEND_BATCH)
        },
        move |call| send_batch(accounts.clone(), call),
    )?;

    debug!("Registered MyLog services");
    Ok(())
}

pub(crate) fn unregister(services: &ServiceRegistry) {
    services.unregister(DOMAIN, SERVICE_SEND_LOG);
    services.unregister(DOMAIN, SERVICE_SEND_BATCH);
    debug!("Removed MyLog services");
}

async fn send_log(accounts: Arc<Accounts>, call: ServiceCall) -> ServiceResult {
    let api = accounts.current().ok_or_else(|| not_loaded(&call))?;
    let request = call
        .parse::<LogEntryRequest>()
        .map_err(|e| ServiceError::InvalidData(e.to_string()))?
        .with_defaults();

    match api.create_log_entry(&request).await {
        Ok(result) => {
            debug!(?result, "Log entry created");
            Ok(Some(result))
        }
        Err(err) => Err(failed("Failed to create log entry", err)),
    }
}

async fn send_batch(accounts: Arc<Accounts>, call: ServiceCall) -> ServiceResult {
    let api = accounts.current().ok_or_else(|| not_loaded(&call))?;
    let batch = call
        .parse::<SendBatch>()
        .map_err(|e| ServiceError::InvalidData(e.to_string()))?;

    match api.create_batch_entries(&batch.entries).await {
        Ok(result) => {
            let created = count(&result, "created");
            let failed = count(&result, "failed");
            debug!("Batch created: {} succeeded, {} failed", created, failed);
            Ok(Some(result))
        }
        Err(err) => Err(failed("Failed to create batch entries", err)),
    }
}

fn count(result: &Value, key: &str) -> u64 {
    result.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Generic API failures are logged here; auth and connection failures go
/// back to the caller untouched.
fn failed(what: &str, err: MyLogError) -> ServiceError {
    if let MyLogError::Api(_) = err {
        error!("{}: {}", what, err);
    }
    ServiceError::handler(err)
}

fn not_loaded(call: &ServiceCall) -> ServiceError {
    ServiceError::NotFound {
        domain: call.domain.clone(),
        service: call.service.clone(),
    }
}
