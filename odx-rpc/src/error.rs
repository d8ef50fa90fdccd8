//! Error type for the RPC client.

use thiserror::Error;

/// Result type alias using the RPC error type.
pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Error, Debug)]
pub enum RpcError {
    /// The server rejected the credentials (uid came back empty/false).
    #[error("Authentication failed for user '{0}': check username, password and database name")]
    Auth(String),

    /// Server-side fault (Odoo raises these for access errors, bad domains,
    /// constraint violations inside a batch, ...).
    #[error("Server fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response was not a well-formed method response.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// The call succeeded but returned a shape the helper cannot use
    /// (e.g. a string where record ids were expected).
    #[error("Unexpected response shape: {0}")]
    Shape(String),
}

impl From<quick_xml::Error> for RpcError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
