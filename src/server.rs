//! Local verification endpoint.
//!
//! One synchronous operation: `POST /verify` takes a token, runs it against the current
//! key-set snapshot, and answers with an explicit `ok` flag. Rejections carry an opaque
//! reason string and nothing else.

// crates.io
use axum::{
	Json, Router,
	body::Bytes,
	extract::State,
	http::StatusCode,
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, config::Config, keyset::KeySetManager, verify};

/// Maximum accepted request body size.
const MAX_BODY_BYTES: usize = 1_048_576;

/// Request body accepted by `POST /verify`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VerifyRequest {
	/// Raw bearer token to verify.
	pub token: String,
}

/// Structured verification result returned to the caller.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct VerifyResponse {
	/// Whether verification succeeded.
	pub ok: bool,
	/// Canonical identity; present only on success.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub spiffe_id: Option<String>,
	/// Full decoded claim set; present only on success, never partially.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub claims: Option<serde_json::Map<String, serde_json::Value>>,
	/// Opaque rejection reason; present only on failure.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
	/// Key-set manager supplying the current snapshot.
	pub manager: Arc<KeySetManager>,
	/// Process configuration.
	pub config: Arc<Config>,
}

/// Build the verification router.
///
/// Unrouted methods on `/verify` answer 405 through axum's method routing.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/verify", post(handle_verify))
		.route("/healthz", get(handle_healthz))
		.with_state(state)
}

/// Bind the router to the listener and serve until the process exits.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
	tracing::info!(addr = %listener.local_addr()?, "verification endpoint listening");

	axum::serve(listener, router(state)).await?;

	Ok(())
}

async fn handle_healthz() -> &'static str {
	"ok"
}

async fn handle_verify(
	State(state): State<AppState>,
	body: Bytes,
) -> (StatusCode, Json<VerifyResponse>) {
	let Some(token) = parse_request(&body) else {
		return reject(StatusCode::BAD_REQUEST, "invalid request");
	};
	let snapshot = state.manager.snapshot().await;

	match verify::verify(&token, &snapshot, &state.config) {
		Ok(verified) => (
			StatusCode::OK,
			Json(VerifyResponse {
				ok: true,
				spiffe_id: Some(verified.spiffe_id),
				claims: Some(verified.claims),
				error: None,
			}),
		),
		Err(err) => {
			tracing::debug!(error = %err, "token rejected");

			reject(StatusCode::UNAUTHORIZED, &err.to_string())
		},
	}
}

/// Accept only a well-formed JSON body carrying a non-blank token.
fn parse_request(body: &Bytes) -> Option<String> {
	if body.len() > MAX_BODY_BYTES {
		return None;
	}

	let request = serde_json::from_slice::<VerifyRequest>(body).ok()?;
	let token = request.token.trim();

	(!token.is_empty()).then(|| token.to_owned())
}

fn reject(status: StatusCode, reason: &str) -> (StatusCode, Json<VerifyResponse>) {
	(status, Json(VerifyResponse { ok: false, error: Some(reason.to_owned()), ..Default::default() }))
}
