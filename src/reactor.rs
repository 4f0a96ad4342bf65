use anyhow::{Result, anyhow};
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinSet, LocalSet};
use tracing::{debug, error, info, warn};

/// Handler serves one accepted connection. A handler value is built inside
/// its reactor thread and cloned for every connection, so it may hold
/// thread-local state
pub trait Handler: Clone + 'static {
    fn handle(
        self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<()>> + 'static;
}

/// Reactor is a bound listening socket waiting to be served by its own
/// single-threaded event loop
pub struct Reactor {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

/// Reactor implementation block
impl Reactor {
    /// bind binds the listening socket right away so the address is known
    /// before the loop starts; port 0 picks a free port
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// spawn starts the event loop on a dedicated thread. `make_handler` runs
    /// on that thread
    pub fn spawn<H, F>(self, make_handler: F) -> Result<ReactorHandle>
    where
        H: Handler,
        F: FnOnce() -> H + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let local_addr = self.local_addr;
        let listener = self.listener;

        let thread = thread::Builder::new()
            .name(format!("reactor-{}", local_addr.port()))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("reactor on {} failed to start: {}", local_addr, e);
                        return;
                    }
                };

                let local = LocalSet::new();
                local.block_on(&runtime, serve(listener, make_handler(), stop_rx));
            })?;

        // DEBUG
        info!("listening on {}", local_addr);

        Ok(ReactorHandle {
            local_addr,
            stop: stop_tx,
            thread: Some(thread),
        })
    }
}

/// serve accepts connections until asked to stop. Every connection runs as
/// its own local task; failures are logged and never end the loop
async fn serve<H: Handler>(
    listener: std::net::TcpListener,
    handler: H,
    mut stop: watch::Receiver<bool>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to register listener: {}", e);
            return;
        }
    };

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    // DEBUG
                    debug!("new connection: {}", peer);

                    let handler = handler.clone();
                    connections.spawn_local(async move {
                        if let Err(e) = handler.handle(stream, peer).await {
                            warn!("connection {} closed: {:#}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("accept failed: {}", e),
            },
            Some(joined) = connections.join_next() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!("connection task panicked: {}", e);
                    }
                }
            }
        }
    }

    // In-flight connections are abandoned
    connections.shutdown().await;

    if let Ok(addr) = listener.local_addr() {
        info!("stopped listening on {}", addr);
    }
}

/// ReactorHandle controls a running reactor. Dropping it asks the reactor
/// to stop without waiting for it
pub struct ReactorHandle {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
    thread: Option<JoinHandle<()>>,
}

/// ReactorHandle implementation block
impl ReactorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// stop asks the loop to exit on its next wake-up
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// join waits for the reactor thread to finish
    pub fn join(mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow!("reactor on {} panicked", self.local_addr)),
            None => Ok(()),
        }
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}
