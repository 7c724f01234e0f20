//! Shared helpers for the integration suite: ES256 test keys, token minting, mock issuer
//! endpoints, and a real server bound to an ephemeral port.

#![allow(dead_code)]

// std
use std::{
	net::SocketAddr,
	sync::Arc,
	time::{Duration, SystemTime, UNIX_EPOCH},
};
// crates.io
use base64::prelude::*;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use p256::{
	SecretKey,
	elliptic_curve::sec1::ToEncodedPoint,
	pkcs8::{EncodePrivateKey, LineEnding},
};
use rand_core::OsRng;
use serde_json::{Value, json};
use spiffe_verifier::{
	config::Config,
	keyset::KeySetManager,
	server::{self, AppState},
};
use tokio::net::TcpListener;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

pub const AUDIENCE: &str = "spiffe-verifier";
pub const TRUST_DOMAIN: &str = "spiffe://example.org";
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/keys";

/// An ES256 keypair with its public JWK form.
pub struct TestKey {
	pub kid: String,
	pub encoding_key: EncodingKey,
	pub jwk: Value,
}
impl TestKey {
	pub fn generate(kid: &str) -> Self {
		let secret = SecretKey::random(&mut OsRng);
		let pem = secret.to_pkcs8_pem(LineEnding::LF).expect("pkcs8 encoding");
		let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes()).expect("ec pem");
		let point = secret.public_key().to_encoded_point(false);
		let jwk = json!({
			"kty": "EC",
			"crv": "P-256",
			"use": "sig",
			"alg": "ES256",
			"kid": kid,
			"x": BASE64_URL_SAFE_NO_PAD.encode(point.x().expect("x coordinate")),
			"y": BASE64_URL_SAFE_NO_PAD.encode(point.y().expect("y coordinate")),
		});

		Self { kid: kid.to_owned(), encoding_key, jwk }
	}

	/// Sign `claims` under this key, stamping the key id into the header.
	pub fn mint(&self, claims: &Value) -> String {
		let mut header = Header::new(Algorithm::ES256);

		header.kid = Some(self.kid.clone());

		jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("token encoding")
	}

	/// Sign `claims` without any key id in the header.
	pub fn mint_without_kid(&self, claims: &Value) -> String {
		let header = Header::new(Algorithm::ES256);

		jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("token encoding")
	}
}

pub fn jwks_body(keys: &[&TestKey]) -> Value {
	json!({ "keys": keys.iter().map(|key| key.jwk.clone()).collect::<Vec<_>>() })
}

pub fn now_secs() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).expect("clock").as_secs()
}

/// Standard claim set: valid for ten minutes, issued by `issuer`, for the default audience.
pub fn base_claims(issuer: &str, sub: &str) -> Value {
	json!({
		"iss": issuer,
		"sub": sub,
		"aud": AUDIENCE,
		"exp": now_secs() + 600,
		"iat": now_secs(),
	})
}

/// Mount discovery and key-set endpoints on the mock issuer.
pub async fn mount_issuer(server: &MockServer, jwks: &Value) {
	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"issuer": server.uri(),
			"jwks_uri": format!("{}{}", server.uri(), JWKS_PATH),
		})))
		.mount(server)
		.await;
	Mock::given(method("GET"))
		.and(path(JWKS_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(jwks.clone()))
		.mount(server)
		.await;
}

pub fn test_config(issuer: &str) -> Config {
	config_with_trust_domain(issuer, TRUST_DOMAIN)
}

pub fn config_with_trust_domain(issuer: &str, trust_domain: &str) -> Config {
	Config {
		issuer_url: issuer.parse().expect("issuer url"),
		audience: AUDIENCE.into(),
		trust_domain: trust_domain.into(),
		refresh_interval: Duration::from_secs(120),
		http_timeout: Duration::from_secs(2),
		listen_addr: "127.0.0.1:0".parse().expect("listen addr"),
	}
}

/// Bind the real server to an ephemeral port and return its base URL.
pub async fn spawn_endpoint(manager: Arc<KeySetManager>, config: Config) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
	let addr: SocketAddr = listener.local_addr().expect("local addr");
	let state = AppState { manager, config: Arc::new(config) };

	tokio::spawn(async move {
		let _ = server::serve(listener, state).await;
	});

	format!("http://{addr}")
}
