/// Errors that can occur within the dispatch subsystem.
///
/// Handler traits return `anyhow::Result` at their boundary; these
/// variants are the concrete failures constructed by the built-in
/// handlers before being logged.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The target URL/endpoint is not present in the configured
    /// allow-list.
    #[error("notify: target '{0}' not in allow list")]
    TargetNotAllowed(String),

    /// An HTTP request to an external endpoint failed at the transport
    /// level (connection error or timeout).
    #[error("notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external endpoint returned a non-success response.
    #[error("notify: endpoint returned status {status}: {body}")]
    Api { status: u16, body: String },
}
