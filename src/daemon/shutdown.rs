use tokio::select;
use tokio_util::sync::CancellationToken;

/// Detects signals sent to the process and triggers cancelation. On unix both
/// SIGINT and SIGTERM are handled; elsewhere only ctrl-c is available, so
/// detached processes may need another way of being told to stop.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        use tracing::error;

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                };
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler {e:?}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        cancelation.cancel();
    }
    #[cfg(not(unix))]
    {
        select! {
            _ = tokio::signal::ctrl_c() => {
                cancelation.cancel();
            },
        };
    }
}
