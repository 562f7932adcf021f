/// Errors returned by [`crate::PrismClient`].
///
/// The first three variants are transport failures and map one-to-one onto
/// the health counters bumped by the client: connection timeout, DNS lookup
/// failure and generic exception.
///
/// # Examples
///
/// ```rust
/// use prism_client::error::PrismError;
///
/// let err = PrismError::Status { status: 503, body: "busy".to_string() };
/// assert!(err.to_string().contains("503"));
/// assert!(!err.is_transport());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PrismError {
    #[error("Prism API request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Prism API host could not be resolved: {0}")]
    Dns(#[source] reqwest::Error),

    #[error("Prism API transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Prism answered with a status code of 400 or above.
    #[error("Prism API HTTP error: status={status}, body={body}")]
    Status { status: u16, body: String },

    /// The response body is not valid JSON, or not the JSON shape expected.
    #[error("Prism API returned an undecodable body: {0}")]
    Decode(String),

    #[error("invalid Prism API url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl PrismError {
    /// Classify a `reqwest` send/read failure into one of the transport classes.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PrismError::Timeout(err)
        } else if is_dns_failure(&err) {
            PrismError::Dns(err)
        } else {
            PrismError::Transport(err)
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            PrismError::Timeout(_) | PrismError::Dns(_) | PrismError::Transport(_)
        )
    }
}

const DNS_MARKERS: [&str; 5] = [
    "dns error",
    "failed to lookup address",
    "no such host",
    "name or service not known",
    "nodename nor servname",
];

/// hyper/reqwest surface resolver failures only as text in the source chain.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    if !err.is_connect() && !err.is_request() {
        return false;
    }
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_lowercase();
        if DNS_MARKERS.iter().any(|m| text.contains(m)) {
            return true;
        }
        current = e.source();
    }
    false
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, PrismError>;
