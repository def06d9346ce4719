use std::{future::Future, sync::Arc, time::Duration};

use slashbot_slack::{
    events::default_dispatcher,
    socket::{SocketError, SocketModeRunner, SocketTransport},
    SlashCommandService,
};
use tokio::sync::oneshot;
use tracing::warn;

/// Runs socket mode until `shutdown` resolves. The runner's own disconnect is bounded by
/// `grace`.
pub async fn run_socket_mode<F>(
    runner: &SocketModeRunner,
    shutdown: F,
    grace: Duration,
) -> Result<(), SocketError>
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let run = runner.run(async {
        let _ = stop_rx.await;
    });
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = shutdown => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(grace, &mut run).await {
        Ok(result) => result,
        Err(_) => {
            warn!(grace_secs = grace.as_secs_f64(), "socket mode disconnect timed out");
            Ok(())
        }
    }
}

pub fn build_runner(
    transport: Arc<dyn SocketTransport>,
    service: Arc<dyn SlashCommandService>,
) -> SocketModeRunner {
    SocketModeRunner::new(transport, default_dispatcher(service))
}
