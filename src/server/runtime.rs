//! Runtime control for [`ToolServer`].

mod accept;
mod backoff;

use std::sync::Arc;

pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::{Future, future::join_all};
use log::{info, warn};
use tokio::{select, signal, time::timeout};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, ServerError, ToolServer, connection::ConnectionOptions};

impl ToolServer<Bound> {
    /// Run the server until Ctrl+C is received.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    ///
    /// use toolwire::{host::ToolHost, server::ToolServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), toolwire::server::ServerError> {
    /// let server = ToolServer::new(Arc::new(ToolHost::new())).bind(([127, 0, 0, 1], 7071).into())?;
    /// server.run().await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Accept failures are retried with exponential back-off and do not
    /// surface as errors; the `Result` is reserved for future runtime
    /// failures.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until the `shutdown` future resolves.
    ///
    /// On shutdown the listener stops accepting, every open session is
    /// closed and connection tasks are awaited for up to the session
    /// shutdown grace period.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use tokio::sync::oneshot;
    /// use toolwire::{host::ToolHost, server::ToolServer};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), toolwire::server::ServerError> {
    /// let server = ToolServer::new(Arc::new(ToolHost::new())).bind(([127, 0, 0, 1], 0).into())?;
    ///
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(async move {
    ///     server
    ///         .run_with_shutdown(async {
    ///             let _ = rx.await;
    ///         })
    ///         .await
    /// });
    ///
    /// let _ = tx.send(());
    /// handle
    ///     .await
    ///     .expect("join server task")
    ///     .expect("server run failed");
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let ToolServer {
            handler,
            session_config,
            backoff,
            mode,
            observer,
            registry,
            ready_tx,
            state: Bound { listener },
        } = self;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let local_addr = listener.local_addr().ok();

        tracker.spawn(accept_loop(
            Arc::clone(&listener),
            AcceptLoopOptions {
                connection: ConnectionOptions {
                    handler,
                    config: session_config,
                    mode,
                    observer,
                    registry: Arc::clone(&registry),
                    shutdown: shutdown_token.clone(),
                },
                shutdown: shutdown_token.clone(),
                tracker: tracker.clone(),
                backoff,
            },
        ));
        info!("server listening: local_addr={local_addr:?}, mode={mode:?}");

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        let sessions = registry.active_sessions();
        info!("server shutting down: open_sessions={}", sessions.len());
        join_all(sessions.iter().map(|session| session.close())).await;

        tracker.close();
        let grace = session_config.shutdown_grace_value();
        if timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                "connection tasks still running after {grace:?}: remaining={}",
                tracker.len()
            );
        }
        info!("server stopped: local_addr={local_addr:?}");
        Ok(())
    }
}
