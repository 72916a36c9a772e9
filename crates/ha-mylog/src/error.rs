//! MyLog API errors

use thiserror::Error;

/// Result type for MyLog API operations
pub type MyLogResult<T> = Result<T, MyLogError>;

/// The three ways a call to the MyLog API can fail
///
/// Match on the variant to handle one kind, or treat the whole enum as
/// "the API call failed".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MyLogError {
    /// The API key was rejected (HTTP 401)
    #[error("{0}")]
    Auth(String),

    /// The service could not be reached or answered with something unusable
    #[error("{0}")]
    Connection(String),

    /// Any other error status
    #[error("{0}")]
    Api(String),
}

impl MyLogError {
    pub fn message(&self) -> &str {
        match self {
            MyLogError::Auth(message) | MyLogError::Connection(message) | MyLogError::Api(message) => {
                message
            }
        }
    }
}
