//! Service call type for invoking Home Assistant services

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Represents a call to a registered service
///
/// By the time a handler sees a call, its `service_data` has already passed
/// the schema the service was registered with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// The domain the service belongs to (e.g., "mylog")
    pub domain: String,

    /// The service name (e.g., "send_log")
    pub service: String,

    /// Data passed to the service
    pub service_data: serde_json::Value,
}

impl ServiceCall {
    /// Create a new service call
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
        }
    }

    /// Get the full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Get a single value from service_data
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the whole of service_data into a typed request
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.service_data.clone())
    }
}

/// Whether a service supports returning a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportsResponse {
    /// Service never returns a response
    #[default]
    None,
    /// Service may optionally return a response
    Optional,
    /// Service always returns a response
    Only,
}
