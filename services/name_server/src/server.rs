//! Name server accept loop
//!
//! The listener runs on tokio; every accepted socket is handed to a
//! blocking task running the synchronous protocol engine. All connections
//! share one [`NameService`] and one carrier registry.

use crate::handler::handle_connection;
use anyhow::{Context, Result};
use mw_config::{MiddlewareConfig, NameServerConfig, ProtocolSettings};
use naming::{NameService, NameServiceSettings};
use network::{CarrierRegistry, InterruptHandle, SocketStream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use types::Contact;

/// Registry settings derived from the server's configuration
pub fn service_settings(config: &NameServerConfig) -> NameServiceSettings {
    NameServiceSettings {
        base_port: config.base_port(),
        legacy_step: config.legacy_step,
        mcast_base_port: config.mcast_base_port(),
        tmp_prefix: config.tmp_prefix.clone(),
        ..NameServiceSettings::default()
    }
}

type Connections = Arc<Mutex<HashMap<u64, InterruptHandle>>>;

pub struct NameServer {
    listener: TcpListener,
    service: Arc<NameService>,
    registry: Arc<CarrierRegistry>,
    protocol: ProtocolSettings,
    namespace: String,
    connections: Connections,
}

impl NameServer {
    /// Bind the listener and register the server under its namespace
    pub async fn bind(config: &MiddlewareConfig) -> Result<Self> {
        let service = NameService::new(service_settings(&config.name_server)).with_event_listener(
            |event| debug!(event = %event, "registration changed"),
        );
        Self::bind_with_service(config, Arc::new(service)).await
    }

    /// Bind around an existing service, e.g. one shared with other code
    pub async fn bind_with_service(
        config: &MiddlewareConfig,
        service: Arc<NameService>,
    ) -> Result<Self> {
        let registry = CarrierRegistry::from_names(&config.protocol.carriers)
            .context("Failed to build carrier registry")?;
        let address = config.name_server.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind name server to {}", address))?;
        let local = listener.local_addr().context("Failed to read bound address")?;

        let namespace = config.name_server.namespace.clone();
        let own = Contact::new(
            namespace.as_str(),
            config.name_server.host.as_str(),
            i32::from(local.port()),
            "tcp",
        );
        service
            .register_root(&namespace, &own)
            .context("Failed to register name server")?;

        Ok(Self {
            listener,
            service,
            registry: Arc::new(registry),
            protocol: config.protocol.clone(),
            namespace,
            connections: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> Arc<NameService> {
        self.service.clone()
    }

    /// Accept connections until `shutdown` resolves, then interrupt open ones
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(namespace = %self.namespace, address = %self.local_addr()?, "name server listening");
        tokio::pin!(shutdown);
        let mut next_id = 0u64;

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    next_id += 1;
                    self.spawn_connection(next_id, socket, peer);
                }
                _ = &mut shutdown => break,
            }
        }

        let open: Vec<InterruptHandle> = self.connections.lock().drain().map(|(_, h)| h).collect();
        info!(connections = open.len(), "name server stopping");
        for handle in open {
            handle.interrupt();
        }
        Ok(())
    }

    fn spawn_connection(&self, id: u64, socket: tokio::net::TcpStream, peer: SocketAddr) {
        let stream = match Self::blocking_stream(socket) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer = %peer, error = %e, "could not hand over connection");
                return;
            }
        };
        match stream.interrupt_handle() {
            Ok(handle) => {
                self.connections.lock().insert(id, handle);
            }
            Err(e) => debug!(peer = %peer, error = %e, "connection cannot be interrupted"),
        }

        let service = self.service.clone();
        let registry = self.registry.clone();
        let settings = self.protocol.clone();
        let connections = self.connections.clone();
        tokio::task::spawn_blocking(move || {
            debug!(peer = %peer, "connection accepted");
            if let Err(e) = handle_connection(stream, &service, registry, &settings) {
                error!(peer = %peer, error = %e, category = e.category(), "connection failed");
            }
            connections.lock().remove(&id);
        });
    }

    fn blocking_stream(socket: tokio::net::TcpStream) -> network::Result<SocketStream> {
        let socket = socket.into_std()?;
        socket.set_nonblocking(false)?;
        SocketStream::from_tcp(socket)
    }
}
