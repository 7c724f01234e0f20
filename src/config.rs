//! Environment-sourced process configuration.
//!
//! Loaded once at startup and never mutated afterwards; every component reads the same
//! immutable view.

// std
use std::{
	env,
	net::{IpAddr, Ipv4Addr, SocketAddr},
};
// crates.io
use url::Url;
// self
use crate::_prelude::*;

/// Default interval between key-set refresh ticks.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);
/// Default per-request timeout for outbound HTTP calls.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(2);
/// Default listen address for the verification endpoint.
pub const DEFAULT_LISTEN_ADDR: SocketAddr =
	SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2773);

/// Immutable process-lifetime configuration for the verifier sidecar.
#[derive(Clone, Debug)]
pub struct Config {
	/// Base URL of the token issuer; discovery metadata is fetched beneath it.
	pub issuer_url: Url,
	/// Audience value every accepted token must carry.
	pub audience: String,
	/// Trust-domain prefix every accepted subject must live under (no trailing slash).
	pub trust_domain: String,
	/// Interval between key-set refresh ticks.
	pub refresh_interval: Duration,
	/// Timeout applied to each outbound HTTP request.
	pub http_timeout: Duration,
	/// Local address the verification endpoint binds to.
	pub listen_addr: SocketAddr,
}
impl Config {
	/// Load configuration from the process environment.
	///
	/// `OIDC_ISSUER_URL`, `EXPECTED_AUDIENCE`, and `REQUIRED_TRUST_DOMAIN` are required;
	/// `JWKS_REFRESH` and `HTTP_TIMEOUT` take integer seconds and fall back to their
	/// defaults on absence or parse failure; `LISTEN_ADDR` must be a valid socket address
	/// when set.
	pub fn from_env() -> Result<Self> {
		let issuer_url = Url::parse(&required("OIDC_ISSUER_URL")?)?;
		let audience = required("EXPECTED_AUDIENCE")?;
		let trust_domain = normalize_trust_domain(&required("REQUIRED_TRUST_DOMAIN")?);
		let refresh_interval =
			parse_duration_secs(env::var("JWKS_REFRESH").ok(), DEFAULT_REFRESH_INTERVAL);
		let http_timeout = parse_duration_secs(env::var("HTTP_TIMEOUT").ok(), DEFAULT_HTTP_TIMEOUT);
		let listen_addr = match env::var("LISTEN_ADDR") {
			Ok(raw) => raw.trim().parse().map_err(|_| Error::Validation {
				field: "LISTEN_ADDR",
				reason: format!("'{raw}' is not a valid socket address."),
			})?,
			Err(_) => DEFAULT_LISTEN_ADDR,
		};

		Ok(Self { issuer_url, audience, trust_domain, refresh_interval, http_timeout, listen_addr })
	}
}

fn required(name: &'static str) -> Result<String> {
	env::var(name)
		.ok()
		.map(|value| value.trim().to_owned())
		.filter(|value| !value.is_empty())
		.ok_or(Error::Config { name })
}

/// Parse an integer-seconds value, falling back to `default` when absent, malformed, or zero.
fn parse_duration_secs(value: Option<String>, default: Duration) -> Duration {
	value
		.and_then(|raw| raw.trim().parse::<u64>().ok())
		.filter(|secs| *secs > 0)
		.map(Duration::from_secs)
		.unwrap_or(default)
}

/// Strip any trailing slashes so the prefix check can append exactly one.
fn normalize_trust_domain(raw: &str) -> String {
	raw.trim_end_matches('/').to_owned()
}
