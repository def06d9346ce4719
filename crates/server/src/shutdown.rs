use std::{future::Future, io, time::Duration};

use axum::Router;
use tokio::{net::TcpListener, sync::oneshot, task::JoinError};
use tracing::{info, warn};

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(signal = "SIGINT", "shutdown signal received"),
        _ = terminate => info!(signal = "SIGTERM", "shutdown signal received"),
    }
}

/// Serves `router` until `shutdown` resolves, then drains in-flight requests for at most
/// `grace` before aborting the server task.
pub async fn serve_until<F>(
    listener: TcpListener,
    router: Router,
    shutdown: F,
    grace: Duration,
) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => return flatten(result),
        _ = shutdown => {}
    }

    info!(grace_secs = grace.as_secs_f64(), "draining in-flight requests");
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => flatten(result),
        Err(_) => {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "graceful shutdown timed out; aborting server"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten(result: Result<io::Result<()>, JoinError>) -> io::Result<()> {
    result.map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use axum::{routing::get, Router};
    use tokio::{net::TcpListener, sync::oneshot};

    use super::serve_until;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        (listener, url)
    }

    #[tokio::test]
    async fn serves_until_shutdown_then_returns() {
        let (listener, url) = listener().await;
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve_until(
            listener,
            router,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_secs(5),
        ));

        let body = reqwest::get(format!("{url}/ping"))
            .await
            .expect("request")
            .text()
            .await
            .expect("body");
        assert_eq!(body, "pong");

        stop_tx.send(()).expect("server still running");
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop within the grace period")
            .expect("server task");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn stuck_requests_are_aborted_after_grace_period() {
        let (listener, url) = listener().await;
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve_until(
            listener,
            router,
            async move {
                let _ = stop_rx.await;
            },
            Duration::from_millis(200),
        ));

        let in_flight = tokio::spawn(reqwest::get(format!("{url}/slow")));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        stop_tx.send(()).expect("server still running");
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should stop after the grace period")
            .expect("server task");

        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
        in_flight.abort();
    }
}
