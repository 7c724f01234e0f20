//! Sidecar verification service for SPIFFE-style JWTs — discovers and refreshes issuer signing
//! keys, enforces trust-domain policy, and tracks its host's lifecycle.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod keyset;
pub mod lifecycle;
pub mod server;
pub mod verify;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use crate::{Error, Result};
}

pub use crate::error::{Error, Result};

/// Install the process-wide tracing subscriber.
///
/// Honours `RUST_LOG` when set; defaults to `info` otherwise.
pub fn init_tracing() {
	use tracing_subscriber::EnvFilter;

	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();
}
