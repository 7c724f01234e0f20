//! Host lifecycle client speaking the Lambda Extensions API.
//!
//! The sidecar registers once, then blocks on a long-poll event stream so it lives exactly
//! as long as its host function. States: unregistered → registered → polling → terminated.

// std
use std::env;
// crates.io
use reqwest::Client;
use serde_json::json;
use tokio::time;
// self
use crate::_prelude::*;

/// Environment variable carrying the host runtime endpoint.
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
/// Extension name declared at registration.
pub const EXTENSION_NAME: &str = "spiffe-verifier";

const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";
/// Fixed backoff between failed event polls.
const POLL_BACKOFF: Duration = Duration::from_millis(200);
/// Upper bound on a single long-poll; a quiet host surfaces as a retryable timeout.
const POLL_TIMEOUT: Duration = Duration::from_secs(10);
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the host's extension lifecycle protocol.
#[derive(Debug)]
pub struct ExtensionClient {
	client: Client,
	base_url: String,
	extension_id: Option<String>,
	poll_timeout: Duration,
}
impl ExtensionClient {
	/// Build a client from the host environment.
	///
	/// Returns `None` when the runtime endpoint is not advertised, which means the process
	/// is running outside host control (local development mode) and the lifecycle state
	/// machine is skipped entirely.
	pub fn from_env() -> Result<Option<Self>> {
		match env::var(RUNTIME_API_ENV) {
			Ok(runtime_api) if !runtime_api.trim().is_empty() =>
				Ok(Some(Self::new(runtime_api.trim())?)),
			_ => Ok(None),
		}
	}

	/// Build a client against an explicit runtime endpoint (`host:port`).
	pub fn new(runtime_api: &str) -> Result<Self> {
		// Each call sets its own per-request bound, so the client itself carries none.
		let client = Client::builder().build()?;

		Ok(Self {
			client,
			base_url: format!("http://{runtime_api}/2020-01-01/extension"),
			extension_id: None,
			poll_timeout: POLL_TIMEOUT,
		})
	}

	/// Override the per-poll timeout.
	pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
		self.poll_timeout = timeout;

		self
	}

	/// Register interest in invocation and shutdown events.
	///
	/// The opaque identifier returned in the response header must accompany every
	/// subsequent call; its absence is a protocol error.
	pub async fn register(&mut self) -> Result<()> {
		let response = self
			.client
			.post(format!("{}/register", self.base_url))
			.timeout(REGISTER_TIMEOUT)
			.header(EXTENSION_NAME_HEADER, EXTENSION_NAME)
			.json(&json!({ "events": ["INVOKE", "SHUTDOWN"] }))
			.send()
			.await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();

			return Err(Error::HostProtocol(format!("registration failed with {status}: {body}")));
		}

		let extension_id = response
			.headers()
			.get(EXTENSION_ID_HEADER)
			.and_then(|value| value.to_str().ok())
			.filter(|value| !value.is_empty())
			.map(str::to_owned)
			.ok_or_else(|| {
				Error::HostProtocol("registration response missing extension identifier".into())
			})?;

		tracing::info!(extension_id = %extension_id, "registered with host runtime");

		self.extension_id = Some(extension_id);

		Ok(())
	}

	/// Block until the host releases the process.
	///
	/// Poll errors are retried forever with a fixed backoff and never crash the process.
	/// Returns on the first successful poll: the event payload's type is deliberately not
	/// interpreted — any successful signal on this path means the host has moved the
	/// process toward termination.
	pub async fn poll_until_shutdown(&self) {
		loop {
			match self.next_event().await {
				Ok(()) => {
					tracing::info!("host signalled; releasing process");

					return;
				},
				Err(err) => {
					tracing::warn!(error = %err, "event poll failed; retrying");

					time::sleep(POLL_BACKOFF).await;
				},
			}
		}
	}

	async fn next_event(&self) -> Result<()> {
		let extension_id = self
			.extension_id
			.as_deref()
			.ok_or_else(|| Error::HostProtocol("event poll before registration".into()))?;
		// Bounded long-poll: a stalled host connection becomes a retryable timeout error
		// instead of wedging the loop; queued events are picked up on the next call.
		let response = self
			.client
			.get(format!("{}/event/next", self.base_url))
			.timeout(self.poll_timeout)
			.header(EXTENSION_ID_HEADER, extension_id)
			.send()
			.await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();

			return Err(Error::HostProtocol(format!("event poll failed with {status}: {body}")));
		}

		Ok(())
	}
}
