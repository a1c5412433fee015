//! DNS server runner: binds UDP+TCP and serves the policy zone.

pub mod handler;

pub use handler::{answer_query, client_serial, Answer, RpzHandler};

use hickory_server::server::ServerFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::sources::loader;
use crate::state;
use crate::upstream::XfrClient;
use crate::SrvError;

/// TCP connection timeout for DNS queries and transfers.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Serve on already bound sockets until `shutdown` resolves.
pub async fn serve_on<F>(
    udp: UdpSocket,
    tcp: TcpListener,
    handler: RpzHandler,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut server = ServerFuture::new(handler);
    server.register_socket(udp);
    server.register_listener(tcp, TCP_TIMEOUT);

    let token = server.shutdown_token().clone();
    tokio::spawn(async move {
        shutdown.await;
        token.cancel();
    });

    server
        .block_until_done()
        .await
        .map_err(|e| SrvError::Server(format!("server error: {e}")))
}

/// Bind UDP and TCP on `listen` and serve until `shutdown` resolves.
pub async fn run<F>(listen: SocketAddr, handler: RpzHandler, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let udp = UdpSocket::bind(listen)
        .await
        .map_err(|e| SrvError::Server(format!("UDP bind {listen}: {e}")))?;
    info!(addr = %listen, "UDP socket bound");

    let tcp = TcpListener::bind(listen)
        .await
        .map_err(|e| SrvError::Server(format!("TCP bind {listen}: {e}")))?;
    info!(addr = %listen, "TCP listener bound");

    info!(addr = %listen, "rpzd policy zone server running");
    serve_on(udp, tcp, handler, shutdown).await
}

/// Load sources, start the coordinator and serve until `shutdown` resolves.
///
/// The coordinator is stopped (and the serial persisted) on every exit path
/// once it has started. Returns the final serial.
pub async fn serve<F>(config: &ServerConfig, shutdown: F) -> crate::Result<u32>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let serial = config
        .state_file()
        .map_or(state::INITIAL_SERIAL, |path| state::startup_serial(&path));
    let registry = loader::build_registry(config, chrono::Utc::now().timestamp())?;
    for (list_type, names) in loader::enumerable_counts(&registry) {
        info!(%list_type, names, "enumerable names at startup");
    }

    let fetcher = Arc::new(XfrClient::new(Duration::from_secs(
        config.upstream_timeout_secs,
    )));
    let coordinator = Coordinator::new(config, registry, serial, fetcher)?;
    let reader = coordinator.reader();
    let (handle, task) = coordinator.spawn();

    let served = run(config.listen, RpzHandler::new(reader, handle.clone()), shutdown).await;
    if let Err(e) = &served {
        error!(error = %e, "DNS server stopped");
    }

    handle.shutdown();
    let final_serial = task
        .await
        .map_err(|e| SrvError::Server(format!("coordinator task failed: {e}")))?;
    served?;
    Ok(final_serial)
}
