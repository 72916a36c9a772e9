//! MyLog integration
//!
//! Sends log entries to the MyLog service (<https://mylog.zip>) from Home
//! Assistant automations and scripts.
//!
//! # Key Types
//!
//! - [`MyLogApi`] - Async REST client for one account
//! - [`MyLogIntegration`] - Config entry setup/unload, registers services
//! - [`MyLogConfigFlow`] / [`MyLogOptionsFlow`] - Account setup and test message
//!
//! # Services
//!
//! - `mylog.send_log` - Create one entry (severity `info` and priority `0`
//!   unless given)
//! - `mylog.send_batch` - Create several entries in one request
//!
//! Both are registered while at least one account is loaded and return the
//! server's response when the caller asks for one.

pub mod accounts;
pub mod api;
mod coerce;
pub mod config_flow;
pub mod constants;
pub mod error;
pub mod integration;
pub mod models;
pub mod services;

pub use accounts::Accounts;
pub use api::MyLogApi;
pub use config_flow::{error_code, MyLogConfigFlow, MyLogOptionsFlow};
pub use constants::{DOMAIN, SERVICE_SEND_BATCH, SERVICE_SEND_LOG};
pub use error::{MyLogError, MyLogResult};
pub use integration::MyLogIntegration;
pub use models::{LogEntryRequest, Severity, Status};
pub use services::{log_entry_schema, send_batch_schema};
