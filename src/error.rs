//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the verifier sidecar.
///
/// Per-token rejection reasons live in [`crate::verify::ValidationError`]; this type covers
/// everything else (startup, trust bootstrap, refresh, host protocol).
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Missing required configuration {name}.")]
	Config { name: &'static str },
	#[error("Discovery document invalid: {0}")]
	Discovery(String),
	#[error("Host protocol error: {0}")]
	HostProtocol(String),
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: reqwest::StatusCode, url: url::Url, body: Option<String> },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
