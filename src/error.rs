//! Failure taxonomy for the RPC surface.
//!
//! Every operation returns `Result<_, PluginError>`; the dispatcher in
//! `ipc` is the only place these are rendered into wire errors, so no
//! failure can escape as a transport-level fault.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    /// An operation that needs a session was called before any
    /// successful connect.
    #[error("Not connected to Azure DevOps. Please connect first.")]
    NotConnected,

    /// Session construction failed: malformed organization URL,
    /// rejected credential, or a network failure during the eager
    /// validation call. Carries the underlying cause text verbatim.
    #[error("Failed to connect: {0}")]
    Connect(String),

    /// Azure DevOps rejected or failed to answer a request after a
    /// session was established.
    #[error("{0}")]
    Service(String),

    /// The positional argument list did not match the method's shape.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),
}
