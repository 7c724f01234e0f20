//! Process entry point: wires configuration, the trust bootstrap, the verification
//! endpoint, and the host lifecycle loop together.

// std
use std::sync::Arc;
// crates.io
use tokio::{net::TcpListener, signal};
// self
use spiffe_verifier::{
	Result,
	config::Config,
	keyset::KeySetManager,
	lifecycle::ExtensionClient,
	server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
	spiffe_verifier::init_tracing();

	let config = Arc::new(Config::from_env()?);
	let host = match ExtensionClient::from_env()? {
		Some(mut client) => {
			// Under host control, registration is mandatory; the host will not route
			// lifecycle events to a process it does not know about.
			client.register().await?;

			Some(client)
		},
		None => {
			tracing::warn!("host runtime not available; running in local development mode");

			None
		},
	};
	// No serving without trust material: bootstrap failure is fatal.
	let manager = Arc::new(KeySetManager::bootstrap(&config).await?);

	tokio::spawn(manager.clone().run_refresh_loop());

	let listener = TcpListener::bind(config.listen_addr).await?;
	let state = AppState { manager, config: config.clone() };

	tokio::spawn(async move {
		if let Err(err) = server::serve(listener, state).await {
			tracing::error!(error = %err, "verification endpoint failed");

			std::process::exit(1);
		}
	});

	match host {
		Some(client) => client.poll_until_shutdown().await,
		None => signal::ctrl_c().await?,
	}

	tracing::info!("shutting down");

	Ok(())
}
