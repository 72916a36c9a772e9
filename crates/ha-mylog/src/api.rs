//! Async client for the MyLog REST API

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::constants::{
    API_BASE_URL, API_KEY_HEADER, BATCH_TIMEOUT, HEALTH_CHECK_TIMEOUT, LOG_ENTRY_TIMEOUT,
};
use crate::error::{MyLogError, MyLogResult};
use crate::models::LogEntryRequest;

/// Client for one MyLog account
///
/// The underlying HTTP session is opened on first use and kept until
/// [`close`](Self::close). A request after `close` opens a fresh one.
pub struct MyLogApi {
    api_url: String,
    api_key: String,
    session: Mutex<Option<Client>>,
}

impl MyLogApi {
    /// Client for the public MyLog instance
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_api_url(api_key, API_BASE_URL)
    }

    /// Client for a MyLog API rooted somewhere else
    pub fn with_api_url(api_key: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            session: Mutex::new(None),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn session(&self) -> MyLogResult<Client> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder().build().map_err(connection_error)?;
        debug!(api_url = %self.api_url, "Opened MyLog session");
        *session = Some(client.clone());
        Ok(client)
    }

    /// Whether no session is currently open
    pub fn is_closed(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Release the HTTP session. Safe to call any number of times.
    pub fn close(&self) {
        let closed = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if closed.is_some() {
            debug!(api_url = %self.api_url, "Closed MyLog session");
        }
    }

    /// Check that the API is reachable
    ///
    /// Returns the health document unchanged. Anything other than a 200 with
    /// a JSON body is a connection error.
    pub async fn health_check(&self) -> MyLogResult<Value> {
        let url = format!("{}/health", self.api_url);
        let response = self
            .session()?
            .get(&url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(connection_error)?;

        if response.status() != StatusCode::OK {
            return Err(MyLogError::Connection(format!(
                "Health check failed: {}",
                response.status().as_u16()
            )));
        }

        response.json().await.map_err(connection_error)
    }

    /// Create a single log entry
    pub async fn create_log_entry(&self, entry: &LogEntryRequest) -> MyLogResult<Value> {
        self.post("/api/v1/logs", entry, LOG_ENTRY_TIMEOUT).await
    }

    /// Create several log entries in one request
    ///
    /// The response (created/failed counts) is returned as the server sent it.
    pub async fn create_batch_entries(&self, entries: &[LogEntryRequest]) -> MyLogResult<Value> {
        self.post("/api/v1/logs/batch", entries, BATCH_TIMEOUT).await
    }

    async fn post<T>(&self, path: &str, body: &T, timeout: Duration) -> MyLogResult<Value>
    where
        T: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .session()?
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(connection_error)?;

        // The body is read before looking at the status so error responses
        // can supply their own message.
        let status = response.status();
        let data: Value = response.json().await.map_err(connection_error)?;
        debug!(%url, status = status.as_u16(), "MyLog responded");

        if status == StatusCode::UNAUTHORIZED {
            return Err(MyLogError::Auth(
                server_message(&data).unwrap_or_else(|| "Authentication failed".to_string()),
            ));
        }
        if status.as_u16() >= 400 {
            return Err(MyLogError::Api(
                server_message(&data)
                    .unwrap_or_else(|| format!("API error: {}", status.as_u16())),
            ));
        }

        Ok(data)
    }
}

impl fmt::Debug for MyLogApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MyLogApi")
            .field("api_url", &self.api_url)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn connection_error(err: reqwest::Error) -> MyLogError {
    MyLogError::Connection(format!("Connection failed: {}", err))
}

fn server_message(data: &Value) -> Option<String> {
    match data.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}
