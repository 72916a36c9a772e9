//! Fixed values shared by the MyLog component

use std::time::Duration;

/// Integration domain
pub const DOMAIN: &str = "mylog";

/// Config entry data key holding the API key
pub const CONF_API_KEY: &str = "api_key";

/// The only MyLog instance
pub const API_BASE_URL: &str = "https://mylog.zip/fastAPI";

/// Shown on the setup form so users know where to get a key
pub const MYLOG_URL: &str = "https://mylog.zip";

/// Every MyLog API key starts with this
pub const API_KEY_PREFIX: &str = "mlk_";

pub const API_KEY_HEADER: &str = "X-API-Key";

pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
pub const LOG_ENTRY_TIMEOUT: Duration = Duration::from_secs(30);
pub const BATCH_TIMEOUT: Duration = Duration::from_secs(60);

pub const SERVICE_SEND_LOG: &str = "send_log";
pub const SERVICE_SEND_BATCH: &str = "send_batch";

/// Title of every entry created by the setup flow
pub const ENTRY_TITLE: &str = "MyLog";

pub const DEFAULT_TEST_TITLE: &str = "Test from Home Assistant";
pub const DEFAULT_TEST_CONTENT: &str = "This is a test message from the MyLog integration.";
pub const TEST_TAGS: [&str; 2] = ["test", "home-assistant"];
