use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rpc_core::{CodecRegistry, RpcError, Service};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dispatch::serve_connection;

/// Owns the registered service table (spec §3 "Server state": a mapping
/// from service name to `Service`, write-once per service) and the
/// server-wide default handle timeout applied to every connection's
/// requests (spec §3 `HandleTimeout`, default 0 = unbounded).
pub struct Server {
    services: Mutex<HashMap<String, Arc<Service>>>,
    handle_timeout: Duration,
}

impl Server {
    pub fn new() -> Self {
        Server {
            services: Mutex::new(HashMap::new()),
            handle_timeout: Duration::ZERO,
        }
    }

    /// Sets the server's per-request handle timeout (spec §4.4 step 3). The
    /// handshake option of the same name is read from the wire but ignored
    /// by the server (spec §6): this value always wins.
    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    pub fn handle_timeout(&self) -> Duration {
        self.handle_timeout
    }

    /// Registers a service. Duplicate names are rejected (spec §4.3).
    pub async fn register(&self, service: Service) -> Result<(), RpcError> {
        let mut guard = self.services.lock().await;
        if guard.contains_key(service.name()) {
            return Err(RpcError::DuplicateService(service.name().to_string()));
        }
        for method in service.method_names() {
            debug!(service = service.name(), method, "rpc server: register");
        }
        guard.insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    pub(crate) async fn lookup(&self, service_name: &str) -> Option<Arc<Service>> {
        self.services.lock().await.get(service_name).cloned()
    }

    /// Serves one already-accepted connection to completion (spec §4.4):
    /// handshake, serve loop, worker fan-out, drain, close. Returns once the
    /// connection's reader has hit EOF/error and every spawned worker has
    /// returned.
    pub async fn serve_conn<S>(self: &Arc<Self>, stream: S, registry: &CodecRegistry<S>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        if let Err(err) = serve_connection(self.clone(), stream, registry).await {
            warn!("rpc server: connection error: {err}");
        }
    }

    /// Convenience accept loop over a `TcpListener` (ambient plumbing; the
    /// accept loop itself is explicitly out of core scope per spec §1, kept
    /// thin here so the workspace is runnable end to end).
    pub async fn listen(
        self: &Arc<Self>,
        listener: TcpListener,
        registry: Arc<CodecRegistry<TcpStream>>,
    ) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!(peer = %addr, "rpc server: accepted connection");
                    let server = self.clone();
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        server.serve_conn(stream, &registry).await;
                        info!(peer = %addr, "rpc server: connection closed");
                    });
                }
                Err(err) => {
                    warn!("rpc server: accept failed: {err}");
                }
            }
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}
