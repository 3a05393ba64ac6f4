//! TCP acceptor: listen socket and session fan-out.
//!
//! Each accepted connection gets its own session task. On shutdown the
//! listener closes first, live sessions are asked to log out, and anything
//! still running after the grace period is aborted.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::session::{run_session, SessionContext};

pub struct Acceptor {
    listener: TcpListener,
    ctx: SessionContext,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind the listen socket described by the settings.
    pub async fn bind(ctx: SessionContext) -> io::Result<Self> {
        let listener = TcpListener::bind(ctx.settings.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!(
            %local_addr,
            comp_id = %ctx.settings.server_comp_id,
            "acceptor listening"
        );
        Ok(Self {
            listener,
            ctx,
            local_addr,
        })
    }

    /// Actual bound address; differs from the configured one when the
    /// settings asked for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires, then drain sessions.
    pub async fn run(self, shutdown: broadcast::Sender<()>) {
        let mut shutdown_rx = shutdown.subscribe();
        let mut tasks: JoinSet<()> = JoinSet::new();
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Some(cap) = self.ctx.settings.max_sessions {
                                if active.load(Ordering::SeqCst) >= cap {
                                    warn!(%peer, cap, "session cap reached, connection refused");
                                    continue;
                                }
                            }
                            info!(%peer, "client connected");
                            let ctx = self.ctx.clone();
                            let rx = shutdown.subscribe();
                            let counter = active.clone();
                            counter.fetch_add(1, Ordering::SeqCst);
                            tasks.spawn(async move {
                                run_session(ctx, stream, peer, rx).await;
                                counter.fetch_sub(1, Ordering::SeqCst);
                            });
                        }
                        Err(err) => warn!("accept failed: {err}"),
                    }
                }

                // Reap completed session tasks as they finish.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}

                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, refusing new connections");
                    break;
                }
            }
        }

        // The listener drops here; sessions received the same broadcast and
        // are sending their Logouts. Give them the grace window.
        drop(self.listener);
        let drained = tokio::time::timeout(self.ctx.settings.shutdown_grace(), async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("grace period elapsed, aborting remaining sessions");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        info!("acceptor stopped");
    }
}
