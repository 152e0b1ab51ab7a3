//! Acceptor - owns the listening socket and wires the pipeline together.
//!
//! One thread per accepted client, exactly one engine thread. Shutdown
//! flips the running flag, stops the queue, and nudges the blocking
//! `accept` awake with a throwaway connection; the engine drains whatever
//! is queued and exits, and session threads end on their next read or
//! push.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::ServerError;
use crate::md::MarketDataPublisher;
use crate::order_book::OrderBook;
use crate::queue::CommandQueue;
use crate::session::{self, OrderIds};
use crate::tick::TickFormat;

/// The exchange: listener, engine thread, and per-client session threads.
pub struct ExchangeServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    queue: Arc<CommandQueue>,
    ids: Arc<OrderIds>,
    running: Arc<AtomicBool>,
    engine: Option<JoinHandle<()>>,
    fmt: TickFormat,
}

impl ExchangeServer {
    /// Bind the listener and start the engine thread.
    ///
    /// Port 0 binds an ephemeral port; the bound address is available via
    /// [`local_addr`](ExchangeServer::local_addr).
    pub fn bind(config: &Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .map_err(|source| ServerError::Bind { port: config.port, source })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let fmt = TickFormat::default();
        let md = if config.md_enabled {
            MarketDataPublisher::new(&config.md_host, config.md_port)
        } else {
            MarketDataPublisher::disabled()
        };

        let queue = Arc::new(CommandQueue::new(config.queue_capacity));
        let mut engine = Engine::new(OrderBook::new(config.book_capacity), fmt, md);
        let pin_core = config.pin_core;
        let engine_queue = queue.clone();
        let engine_handle = thread::Builder::new()
            .name("engine".to_owned())
            .spawn(move || {
                if pin_core {
                    engine.pin_to_core();
                }
                engine.warm_up();
                engine.run(&engine_queue);
            })
            .map_err(ServerError::SpawnEngine)?;

        Ok(Self {
            listener,
            local_addr,
            queue,
            ids: Arc::new(OrderIds::new()),
            running: Arc::new(AtomicBool::new(true)),
            engine: Some(engine_handle),
            fmt,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for stopping the server from another thread (signal handler,
    /// tests). Cloneable and idempotent.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: self.running.clone(),
            queue: self.queue.clone(),
            port: self.local_addr.port(),
        }
    }

    /// Accept connections until shut down, then drain the engine and
    /// return. Session threads are detached; they never touch the book
    /// directly, so they are safe to outlive the accept loop.
    pub fn run(mut self) {
        info!(addr = %self.local_addr, "exchange listening");

        for conn in self.listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            match conn {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    let ids = self.ids.clone();
                    let queue = self.queue.clone();
                    let fmt = self.fmt;
                    let spawned = thread::Builder::new()
                        .name("session".to_owned())
                        .spawn(move || session::run_session(stream, ids, queue, fmt));
                    if let Err(err) = spawned {
                        warn!(%err, "failed to spawn session thread");
                    }
                }
                Err(err) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!(%err, "accept failed");
                }
            }
        }

        // stop() may already have run from the shutdown handle; it is
        // idempotent, and the engine must see it before we join.
        self.queue.stop();
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
        info!("exchange stopped");
    }
}

/// Stops the queue and wakes the acceptor; safe to call more than once.
#[derive(Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    queue: Arc<CommandQueue>,
    port: u16,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.queue.stop();
        // Unblock accept with a throwaway connection.
        let _ = TcpStream::connect((Ipv4Addr::LOCALHOST, self.port));
    }
}
