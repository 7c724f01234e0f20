//! Key-set discovery, caching, and periodic refresh.
//!
//! Trust material is bootstrapped in two stages: the issuer's discovery document names the
//! key-set URI, and the key-set document itself is what rotates. Discovery runs exactly once
//! at startup; only the key set is re-fetched afterwards.

// crates.io
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::Client;
use serde::Deserialize;
use tokio::{
	sync::RwLock,
	time::{self, MissedTickBehavior},
};
use url::Url;
// self
use crate::{_prelude::*, config::Config};

/// Size guard applied to discovery and key-set responses.
pub const MAX_RESPONSE_BYTES: usize = 1_048_576;
/// Well-known path for issuer discovery metadata, relative to the issuer base URL.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Issuer discovery metadata.
///
/// Transient: validated, mined for `jwks_uri`, then discarded.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryDocument {
	/// Canonical issuer identifier tokens must carry in `iss`.
	pub issuer: String,
	/// URI of the key-set document.
	pub jwks_uri: String,
}
impl DiscoveryDocument {
	fn validate(&self) -> Result<()> {
		if self.issuer.trim().is_empty() {
			return Err(Error::Discovery("empty issuer field".into()));
		}
		if self.jwks_uri.trim().is_empty() {
			return Err(Error::Discovery("empty jwks_uri field".into()));
		}

		Ok(())
	}
}

/// Immutable view of the current verification keys.
///
/// Shared as `Arc<KeySetSnapshot>`; readers always observe a complete set, never a
/// partially-updated one.
#[derive(Clone, Debug)]
pub struct KeySetSnapshot {
	/// Issuer the key set was fetched under.
	pub issuer: String,
	/// Parsed verification keys, addressable by key identifier.
	pub keys: JwkSet,
}
impl KeySetSnapshot {
	/// Look up a verification key by key identifier.
	pub fn find(&self, kid: &str) -> Option<&Jwk> {
		self.keys.find(kid)
	}
}

/// Owns the current snapshot and the refresh schedule.
///
/// Publication is a single reference swap under a briefly-held write lock; no lock is ever
/// held across network I/O.
#[derive(Debug)]
pub struct KeySetManager {
	client: Client,
	jwks_uri: Url,
	refresh_interval: Duration,
	current: RwLock<Arc<KeySetSnapshot>>,
}
impl KeySetManager {
	/// Two-stage trust bootstrap: issuer discovery, then the initial key-set fetch.
	///
	/// The sidecar cannot serve without trust material, so any failure here is fatal to
	/// process startup.
	pub async fn bootstrap(config: &Config) -> Result<Self> {
		let client = Client::builder()
			.timeout(config.http_timeout)
			.user_agent(format!("spiffe-verifier/{}", env!("CARGO_PKG_VERSION")))
			.build()?;
		let discovery = fetch_discovery(&client, &config.issuer_url).await?;
		let jwks_uri = Url::parse(&discovery.jwks_uri)?;
		let keys = fetch_key_set(&client, &jwks_uri).await?;
		let snapshot = Arc::new(KeySetSnapshot { issuer: discovery.issuer, keys });

		tracing::info!(
			issuer = %snapshot.issuer,
			jwks_uri = %jwks_uri,
			key_count = snapshot.keys.keys.len(),
			"trust bootstrap complete"
		);

		Ok(Self {
			client,
			jwks_uri,
			refresh_interval: config.refresh_interval,
			current: RwLock::new(snapshot),
		})
	}

	/// Current snapshot; safe under arbitrary read concurrency while a refresh runs.
	pub async fn snapshot(&self) -> Arc<KeySetSnapshot> {
		self.current.read().await.clone()
	}

	/// Re-fetch the key set from the remembered URI and publish it.
	///
	/// Discovery is not repeated; the issuer recorded at bootstrap carries over.
	pub async fn refresh(&self) -> Result<()> {
		let keys = fetch_key_set(&self.client, &self.jwks_uri).await?;
		let issuer = { self.current.read().await.issuer.clone() };
		let snapshot = Arc::new(KeySetSnapshot { issuer, keys });

		// The write lock covers only this swap, never the fetch above.
		*self.current.write().await = snapshot;

		tracing::debug!(jwks_uri = %self.jwks_uri, "key set refreshed");

		Ok(())
	}

	/// Fixed-interval refresh for the lifetime of the process.
	///
	/// A failed tick retains the previous snapshot and self-heals on the next one; nothing
	/// here is fatal.
	pub async fn run_refresh_loop(self: Arc<Self>) {
		let mut ticker = time::interval(self.refresh_interval);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// An interval's first tick completes immediately; bootstrap already published.
		ticker.tick().await;

		loop {
			ticker.tick().await;

			if let Err(err) = self.refresh().await {
				tracing::warn!(error = %err, "key set refresh failed; retaining previous snapshot");
			}
		}
	}
}

/// Fetch and validate the issuer discovery document.
pub async fn fetch_discovery(client: &Client, issuer_url: &Url) -> Result<DiscoveryDocument> {
	let url = discovery_url(issuer_url)?;
	let bytes = get_limited(client, url).await?;
	let document = serde_json::from_slice::<DiscoveryDocument>(&bytes)?;

	document.validate()?;

	Ok(document)
}

/// Fetch and parse the key-set document.
pub async fn fetch_key_set(client: &Client, jwks_uri: &Url) -> Result<JwkSet> {
	let bytes = get_limited(client, jwks_uri.clone()).await?;

	Ok(serde_json::from_slice(&bytes)?)
}

fn discovery_url(issuer_url: &Url) -> Result<Url> {
	let base = format!("{}/", issuer_url.as_str().trim_end_matches('/'));

	Ok(Url::parse(&base)?.join(DISCOVERY_PATH)?)
}

async fn get_limited(client: &Client, url: Url) -> Result<Vec<u8>> {
	let response = client.get(url.clone()).send().await?;
	let status = response.status();

	if !status.is_success() {
		let body = response.text().await.ok();

		return Err(Error::HttpStatus { status, url, body });
	}

	// Reject declared-oversized bodies before buffering anything.
	if let Some(length) = response.content_length()
		&& length > MAX_RESPONSE_BYTES as u64
	{
		return Err(oversize_error(length, &url));
	}

	let bytes = response.bytes().await?;

	// Chunked responses carry no length up front; the guard still holds after the read.
	if bytes.len() > MAX_RESPONSE_BYTES {
		return Err(oversize_error(bytes.len() as u64, &url));
	}

	Ok(bytes.to_vec())
}

fn oversize_error(size: u64, url: &Url) -> Error {
	Error::Validation {
		field: "response size",
		reason: format!(
			"Response size {size} bytes from {url} exceeds the {limit} byte guard.",
			limit = MAX_RESPONSE_BYTES
		),
	}
}
