//! Service registry with async handlers for Home Assistant
//!
//! This crate provides the ServiceRegistry, which manages all registered
//! services. Services are the primary way for automations and users to
//! trigger an integration's behaviour.
//!
//! Every service may carry a JSON Schema. The schema is compiled once at
//! registration and every call is validated against it before the handler
//! is invoked, so handlers only ever see well-formed data.

mod service_call;

pub use service_call::{ServiceCall, SupportsResponse};

use dashmap::DashMap;
use jsonschema::JSONSchema;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<Option<serde_json::Value>, ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when working with services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("invalid service data: {0}")]
    InvalidData(String),

    #[error("invalid schema for {domain}.{service}: {reason}")]
    InvalidSchema {
        domain: String,
        service: String,
        reason: String,
    },

    #[error("service does not support responses")]
    ResponseNotSupported,

    /// The handler itself failed; the original error is kept intact
    #[error("service call failed: {source}")]
    Handler {
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
}

impl ServiceError {
    /// Wrap a handler's own error without losing its type
    pub fn handler<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ServiceError::Handler {
            source: Arc::new(err),
        }
    }

    /// Recover the handler's original error, if it is of type `E`
    pub fn handler_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            ServiceError::Handler { source } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Information about a registered service
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    /// Domain the service belongs to
    pub domain: String,
    /// Service name
    pub service: String,
    /// Human-readable name
    pub name: Option<String>,
    /// Description of what the service does
    pub description: Option<String>,
    /// JSON schema for service data (optional)
    pub schema: Option<serde_json::Value>,
    /// Whether this service supports returning a response
    pub supports_response: SupportsResponse,
}

impl ServiceDescription {
    /// Minimal description with no schema and no response support
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            name: None,
            description: None,
            schema: None,
            supports_response: SupportsResponse::None,
        }
    }

    fn key(&self) -> String {
        service_key(&self.domain, &self.service)
    }
}

/// Internal representation of a registered service
struct RegisteredService {
    handler: ServiceHandler,
    validator: Option<Arc<JSONSchema>>,
    description: ServiceDescription,
}

fn service_key(domain: &str, service: &str) -> String {
    format!("{}.{}", domain, service)
}

/// The service registry manages all registered services
///
/// The ServiceRegistry is responsible for:
/// - Registering services with their handlers and schemas
/// - Validating service data and routing calls to the handler
/// - Providing information about available services
pub struct ServiceRegistry {
    /// Services indexed by "domain.service" key
    services: DashMap<String, RegisteredService>,
}

impl ServiceRegistry {
    /// Create a new empty service registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register a new service
    ///
    /// # Arguments
    /// * `domain` - The domain the service belongs to (e.g., "mylog")
    /// * `service` - The service name (e.g., "send_log")
    /// * `handler` - Async function to handle service calls
    /// * `schema` - Optional JSON schema for validating service data
    /// * `supports_response` - Whether the service can return a response
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
        schema: Option<serde_json::Value>,
        supports_response: SupportsResponse,
    ) -> Result<(), ServiceError>
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let description = ServiceDescription {
            schema,
            supports_response,
            ..ServiceDescription::new(domain, service)
        };
        self.register_with_description(description, handler)
    }

    /// Register a service with full description
    ///
    /// Re-registering an existing `domain.service` replaces it.
    #[instrument(skip_all, fields(domain = %description.domain, service = %description.service))]
    pub fn register_with_description<F, Fut>(
        &self,
        description: ServiceDescription,
        handler: F,
    ) -> Result<(), ServiceError>
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let validator = match &description.schema {
            Some(schema) => {
                let compiled =
                    JSONSchema::compile(schema).map_err(|e| ServiceError::InvalidSchema {
                        domain: description.domain.clone(),
                        service: description.service.clone(),
                        reason: e.to_string(),
                    })?;
                Some(Arc::new(compiled))
            }
            None => None,
        };

        debug!("Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);

        self.services.insert(
            description.key(),
            RegisteredService {
                handler,
                validator,
                description,
            },
        );
        Ok(())
    }

    /// Call a service
    ///
    /// The data is validated against the service schema first; on failure
    /// the handler is not invoked.
    #[instrument(skip(self, service_data))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        return_response: bool,
    ) -> ServiceResult {
        let registered = self
            .services
            .get(&service_key(domain, service))
            .ok_or_else(|| {
                warn!("Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        if return_response && registered.description.supports_response == SupportsResponse::None {
            return Err(ServiceError::ResponseNotSupported);
        }

        let handler = registered.handler.clone();
        let validator = registered.validator.clone();
        drop(registered); // Release the shard lock before validating and calling

        if let Some(validator) = validator {
            validate(&validator, &service_data)?;
        }

        debug!("Calling service");
        let result = handler(ServiceCall::new(domain, service, service_data)).await?;

        if return_response {
            Ok(result)
        } else {
            Ok(None)
        }
    }

    /// Check if a service exists
    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&service_key(domain, service))
    }

    /// Get service description
    pub fn get_service(&self, domain: &str, service: &str) -> Option<ServiceDescription> {
        self.services
            .get(&service_key(domain, service))
            .map(|s| s.description.clone())
    }

    /// Get all services for a domain
    pub fn domain_services(&self, domain: &str) -> Vec<ServiceDescription> {
        self.services
            .iter()
            .filter(|s| s.description.domain == domain)
            .map(|s| s.description.clone())
            .collect()
    }

    /// Get all registered services grouped by domain
    pub fn all_services(&self) -> HashMap<String, Vec<ServiceDescription>> {
        let mut result: HashMap<String, Vec<ServiceDescription>> = HashMap::new();
        for entry in self.services.iter() {
            result
                .entry(entry.description.domain.clone())
                .or_default()
                .push(entry.description.clone());
        }
        result
    }

    /// Unregister a service
    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&service_key(domain, service))
            .is_some();

        if removed {
            debug!("Unregistered service");
        }

        removed
    }

    /// Get total number of registered services
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(validator: &JSONSchema, data: &serde_json::Value) -> Result<(), ServiceError> {
    validator.validate(data).map_err(|errors| {
        let reasons: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        ServiceError::InvalidData(reasons.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop(_: ServiceCall) -> impl Future<Output = ServiceResult> {
        async { Ok(None) }
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();

        registry
            .register(
                "test",
                "echo",
                |call: ServiceCall| async move { Ok(Some(call.service_data)) },
                None,
                SupportsResponse::Optional,
            )
            .unwrap();

        let result = registry
            .call("test", "echo", json!({"msg": "hello"}), true)
            .await
            .unwrap();

        assert_eq!(result, Some(json!({"msg": "hello"})));
    }

    #[tokio::test]
    async fn test_service_not_found() {
        let registry = ServiceRegistry::new();

        let result = registry
            .call("nonexistent", "service", json!({}), false)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_service_without_response() {
        let registry = ServiceRegistry::new();
        registry
            .register("mylog", "send_log", noop, None, SupportsResponse::None)
            .unwrap();

        let result = registry.call("mylog", "send_log", json!({}), false).await;
        assert!(result.is_ok());

        let result = registry.call("mylog", "send_log", json!({}), true).await;
        assert!(matches!(result, Err(ServiceError::ResponseNotSupported)));
    }

    #[tokio::test]
    async fn test_schema_rejects_before_handler() {
        let registry = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        registry
            .register(
                "mylog",
                "send_log",
                move |_: ServiceCall| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    }
                },
                Some(json!({
                    "type": "object",
                    "properties": {
                        "priority": {"type": "integer", "minimum": 0, "maximum": 100}
                    },
                    "additionalProperties": false
                })),
                SupportsResponse::None,
            )
            .unwrap();

        let result = registry
            .call("mylog", "send_log", json!({"priority": 101}), false)
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));

        let result = registry
            .call("mylog", "send_log", json!({"colour": "red"}), false)
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry
            .call("mylog", "send_log", json!({"priority": 100}), false)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_schema_is_rejected_at_registration() {
        let registry = ServiceRegistry::new();

        let result = registry.register(
            "mylog",
            "send_log",
            noop,
            Some(json!({"type": 12})),
            SupportsResponse::None,
        );

        assert!(matches!(result, Err(ServiceError::InvalidSchema { .. })));
        assert!(!registry.has_service("mylog", "send_log"));
    }

    #[test]
    fn test_has_service() {
        let registry = ServiceRegistry::new();
        registry
            .register("mylog", "send_log", noop, None, SupportsResponse::None)
            .unwrap();

        assert!(registry.has_service("mylog", "send_log"));
        assert!(!registry.has_service("mylog", "send_batch"));
        assert!(!registry.has_service("light", "send_log"));
    }

    #[test]
    fn test_domain_services() {
        let registry = ServiceRegistry::new();
        for (domain, service) in [
            ("mylog", "send_log"),
            ("mylog", "send_batch"),
            ("system_log", "write"),
        ] {
            registry
                .register(domain, service, noop, None, SupportsResponse::None)
                .unwrap();
        }

        assert_eq!(registry.domain_services("mylog").len(), 2);
        assert_eq!(registry.domain_services("system_log").len(), 1);
        assert_eq!(registry.all_services().len(), 2);
        assert_eq!(registry.service_count(), 3);
    }

    #[test]
    fn test_unregister() {
        let registry = ServiceRegistry::new();
        registry
            .register("mylog", "send_log", noop, None, SupportsResponse::None)
            .unwrap();

        assert!(registry.unregister("mylog", "send_log"));
        assert!(!registry.has_service("mylog", "send_log"));
        assert!(!registry.unregister("mylog", "send_log")); // Already removed
    }

    #[derive(Debug, Error)]
    #[error("remote rejected the entry")]
    struct Rejected;

    #[tokio::test]
    async fn test_handler_error_keeps_its_type() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                "test",
                "fail",
                |_: ServiceCall| async move { Err(ServiceError::handler(Rejected)) },
                None,
                SupportsResponse::None,
            )
            .unwrap();

        let err = registry
            .call("test", "fail", json!({}), false)
            .await
            .unwrap_err();

        assert!(err.handler_error::<Rejected>().is_some());
        assert_eq!(err.to_string(), "service call failed: remote rejected the entry");
    }
}
