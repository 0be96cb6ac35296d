use tracing::info;

/// Resolves when the process receives Ctrl+C or, on unix, SIGTERM.
pub(crate) async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => info!("Received Ctrl+C, shutting down"),
		_ = terminate => info!("Received SIGTERM, shutting down"),
	}
}
