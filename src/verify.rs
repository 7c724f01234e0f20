//! Token validation against the current key-set snapshot.
//!
//! Checks run in a fixed, short-circuiting order: key lookup, signature, temporal claims,
//! issuer, audience, subject, trust domain. No claim is inspected before the signature is
//! verified.

// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey, Validation, decode, decode_header,
	errors::ErrorKind,
	jwk::{AlgorithmParameters, EllipticCurve, Jwk},
};
use serde_json::{Map, Value};
// self
use crate::{config::Config, keyset::KeySetSnapshot};

/// Reasons a token is rejected.
///
/// External callers only ever see the display string of a variant; no structured detail
/// crosses the endpoint boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
	/// The token header carries no key identifier.
	#[error("token header has no key id")]
	MissingKeyId,
	/// No key in the current snapshot matches the token's key identifier.
	///
	/// Expected transiently right after rotation; the consumer's own retry lands on a
	/// refreshed snapshot.
	#[error("no key in the current set matches the token key id")]
	UnknownKeyId,
	/// The token is malformed or its signature does not verify under the selected key.
	#[error("signature verification failed")]
	BadSignature,
	/// The `exp` claim is in the past (or missing).
	#[error("token is expired")]
	Expired,
	/// The `nbf` claim is in the future.
	#[error("token is not yet valid")]
	NotYetValid,
	/// The `iss` claim does not equal the snapshot's recorded issuer.
	#[error("issuer mismatch")]
	IssuerMismatch,
	/// The `aud` claim does not contain the configured audience.
	#[error("audience mismatch")]
	AudienceMismatch,
	/// The `sub` claim is missing or empty.
	#[error("subject claim is missing or empty")]
	MissingSubject,
	/// The subject does not live under the required trust domain.
	#[error("subject is outside the required trust domain")]
	TrustDomainViolation,
}

/// Successful verification outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verified {
	/// Canonical subject identity.
	pub spiffe_id: String,
	/// Full decoded claim set, normalized to JSON-compatible values.
	pub claims: Map<String, Value>,
}

/// Verify a raw token against the given snapshot and configuration.
pub fn verify(
	token: &str,
	snapshot: &KeySetSnapshot,
	config: &Config,
) -> Result<Verified, ValidationError> {
	let header = decode_header(token).map_err(|_| ValidationError::BadSignature)?;
	// No try-all-keys fallback: a token without a kid is rejected outright.
	let kid = header.kid.filter(|kid| !kid.is_empty()).ok_or(ValidationError::MissingKeyId)?;
	let jwk = snapshot.find(&kid).ok_or(ValidationError::UnknownKeyId)?;
	let algorithm = permitted_algorithm(jwk)?;
	let key = DecodingKey::from_jwk(jwk).map_err(|_| ValidationError::BadSignature)?;
	let mut validation = Validation::new(algorithm);

	validation.validate_nbf = true;
	validation.set_issuer(&[&snapshot.issuer]);
	validation.set_audience(&[&config.audience]);

	let data =
		decode::<Map<String, Value>>(token, &key, &validation).map_err(|err| classify(&err))?;
	let claims = data.claims;
	let subject = claims
		.get("sub")
		.and_then(Value::as_str)
		.filter(|subject| !subject.is_empty())
		.ok_or(ValidationError::MissingSubject)?;

	enforce_trust_domain(subject, &config.trust_domain)?;

	let spiffe_id = subject.to_owned();

	Ok(Verified { spiffe_id, claims })
}

/// The single signature algorithm a key may be used with, derived from its type.
///
/// Restricting the allow-list per key rules out both the `none` algorithm and confusion
/// between symmetric and asymmetric families.
fn permitted_algorithm(jwk: &Jwk) -> Result<Algorithm, ValidationError> {
	match &jwk.algorithm {
		AlgorithmParameters::RSA(_) => Ok(Algorithm::RS256),
		AlgorithmParameters::EllipticCurve(params) if params.curve == EllipticCurve::P256 =>
			Ok(Algorithm::ES256),
		_ => Err(ValidationError::BadSignature),
	}
}

fn classify(err: &jsonwebtoken::errors::Error) -> ValidationError {
	match err.kind() {
		ErrorKind::ExpiredSignature => ValidationError::Expired,
		ErrorKind::ImmatureSignature => ValidationError::NotYetValid,
		ErrorKind::InvalidIssuer => ValidationError::IssuerMismatch,
		ErrorKind::InvalidAudience => ValidationError::AudienceMismatch,
		ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
			"exp" => ValidationError::Expired,
			"iss" => ValidationError::IssuerMismatch,
			"aud" => ValidationError::AudienceMismatch,
			_ => ValidationError::BadSignature,
		},
		_ => ValidationError::BadSignature,
	}
}

/// The subject must carry the trust-domain prefix followed by `/`.
///
/// A subject equal to the bare trust domain is a violation.
fn enforce_trust_domain(subject: &str, trust_domain: &str) -> Result<(), ValidationError> {
	if subject.strip_prefix(trust_domain).and_then(|rest| rest.strip_prefix('/')).is_some() {
		Ok(())
	} else {
		Err(ValidationError::TrustDomainViolation)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn trust_domain_requires_prefix_and_separator() {
		let domain = "spiffe://example.org";

		assert!(enforce_trust_domain("spiffe://example.org/svc-a", domain).is_ok());
		assert!(enforce_trust_domain("spiffe://example.org/nested/svc", domain).is_ok());
		// The bare trust domain without a trailing separator must fail.
		assert_eq!(
			enforce_trust_domain("spiffe://example.org", domain),
			Err(ValidationError::TrustDomainViolation)
		);
		assert_eq!(
			enforce_trust_domain("spiffe://example.organisation/svc", domain),
			Err(ValidationError::TrustDomainViolation)
		);
		assert_eq!(
			enforce_trust_domain("spiffe://other.org/svc", domain),
			Err(ValidationError::TrustDomainViolation)
		);
	}

	#[test]
	fn symmetric_keys_are_never_permitted() {
		let jwk = serde_json::from_value::<Jwk>(json!({
			"kty": "oct",
			"kid": "sym-1",
			"k": "c2VjcmV0LXNlY3JldC1zZWNyZXQtc2VjcmV0"
		}))
		.unwrap();

		assert_eq!(permitted_algorithm(&jwk), Err(ValidationError::BadSignature));
	}

	#[test]
	fn error_kinds_map_to_the_validation_taxonomy() {
		use jsonwebtoken::errors::Error as JwtError;

		let cases = [
			(JwtError::from(ErrorKind::ExpiredSignature), ValidationError::Expired),
			(JwtError::from(ErrorKind::ImmatureSignature), ValidationError::NotYetValid),
			(JwtError::from(ErrorKind::InvalidIssuer), ValidationError::IssuerMismatch),
			(JwtError::from(ErrorKind::InvalidAudience), ValidationError::AudienceMismatch),
			(
				JwtError::from(ErrorKind::MissingRequiredClaim("aud".into())),
				ValidationError::AudienceMismatch,
			),
			(JwtError::from(ErrorKind::InvalidSignature), ValidationError::BadSignature),
		];

		for (err, expected) in cases {
			assert_eq!(classify(&err), expected);
		}
	}
}
