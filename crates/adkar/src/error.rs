use thiserror::Error;

/// Failure taxonomy for the generation relay and its consumers.
///
/// The variants map onto the remediation categories the UI distinguishes:
/// `Input` never reaches the engine, `Network` means the engine was
/// unreachable, `Timeout` means the client-side cancellation window expired,
/// and everything else is an application-level failure where the engine was
/// reachable but unhelpful.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("Missing {0} parameter")]
    Input(String),

    /// Raw diagnostic text from the engine, preserved verbatim.
    #[error("{0}")]
    Engine(String),

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("{0}")]
    Network(String),

    #[error("Request timed out. The model is taking too long to respond.")]
    Timeout,

    #[error("Request failed: {0}")]
    RequestFailed(String),
}

impl RelayError {
    /// Machine-readable category the UI keys remediation actions off.
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Input(_) => "input",
            RelayError::Engine(_) | RelayError::EmptyResponse | RelayError::RequestFailed(_) => {
                "application"
            }
            RelayError::Network(_) => "transport",
            RelayError::Timeout => "timeout",
        }
    }
}

fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || (err.status().is_none() && err.is_request())
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        if is_network_error(&error) {
            let msg = if error.is_connect() {
                match error.url().and_then(|u| u.host_str().map(|h| (h.to_string(), u.port()))) {
                    Some((host, port)) => {
                        let port_info = port.map(|p| format!(":{}", p)).unwrap_or_default();
                        format!(
                            "Could not connect to {}{}. Check that the inference engine is running.",
                            host, port_info
                        )
                    }
                    None => "Could not connect to the inference engine.".to_string(),
                }
            } else {
                format!("Network error reaching the inference engine: {}", error)
            };
            return RelayError::Network(msg);
        }

        RelayError::RequestFailed(error.to_string())
    }
}
