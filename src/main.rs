//! Concent service entrypoint: runs the MiddleMan relay's four coroutines against the
//! configured front-end listen address and the upstream Signing Service connection.
//!
//! Bankster and the arbitration layer are exposed as a library surface ([`concent::bankster`],
//! [`concent::arbitration`]) for the component that decodes and verifies signed Golem
//! protocol messages to call into; that component, and therefore a network surface for it,
//! is outside this binary's scope.

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use concent::config::Config;
use concent::relay::{
    self, request_consumer, request_producer, response_consumer, response_producer,
    ConnectionCounter, MiddleManState,
};
use concent::sig_down::SigDown;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    concent::telemetry::init();

    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    let concent_signer = PrivateKeySigner::from_slice(config.concent_private_key.as_bytes())?;
    if concent::types::EthereumAddress::from(concent_signer.address())
        != config.concent_ethereum_signing_address()
    {
        return Err("concent_private_key does not match concent_public_key".into());
    }

    let sig_down = SigDown::try_new()?;
    let cancel = sig_down.cancellation_token();
    let tasks = TaskTracker::new();

    let state = MiddleManState::new(config.connection_counter_limit);
    let connection_counter = ConnectionCounter::new(config.connection_counter_limit);

    let upstream_addr = format!(
        "{}:{}",
        config.signing_service_host, config.signing_service_port
    );
    tracing::info!(upstream_addr, "connecting to Signing Service");
    let upstream = TcpStream::connect(&upstream_addr).await?;
    let (upstream_reader, upstream_writer) = tokio::io::split(upstream);

    let (request_tx, request_rx) = tokio::sync::mpsc::channel(256);

    tasks.spawn(request_consumer(
        request_rx,
        upstream_writer,
        concent_signer.clone(),
        state.clone(),
    ));
    tasks.spawn(response_producer(
        upstream_reader,
        config.signing_service_ethereum_address().into(),
        state.clone(),
    ));

    let listen_addr = SocketAddr::new(config.host, config.port);
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "MiddleMan relay listening for front-end connections");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("shutdown signal received, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::warn!(%error, "failed to accept front-end connection");
                        continue;
                    }
                };
                let connection_id = connection_counter.next_id();
                let state = state.clone();
                let request_tx = request_tx.clone();
                let concent_signer = concent_signer.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    handle_front_end_connection(
                        connection_id,
                        stream,
                        peer_addr,
                        state,
                        request_tx,
                        concent_signer,
                        cancel,
                    )
                    .await;
                });
            }
        }
    }

    tasks.close();
    tasks.wait().await;
    pool.close().await;
    Ok(())
}

async fn handle_front_end_connection(
    connection_id: u64,
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: MiddleManState,
    request_tx: tokio::sync::mpsc::Sender<concent::relay::RequestQueueItem>,
    concent_signer: PrivateKeySigner,
    cancel: CancellationToken,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    let authenticated =
        match relay::auth::authenticate(&mut reader, &mut writer, &concent_signer, &cancel).await
        {
            Ok(peer) => peer,
            Err(error) => {
                tracing::warn!(%peer_addr, %error, "front-end connection failed authentication");
                return;
            }
        };

    let response_rx = state.pool.register(connection_id);
    tracing::info!(
        connection_id,
        %peer_addr,
        address = %authenticated.address,
        "front-end connection authenticated"
    );

    let producer = request_producer(
        connection_id,
        reader,
        authenticated.address,
        request_tx,
        state.clone(),
        cancel,
    );
    let consumer = response_consumer(response_rx, writer, concent_signer);
    tokio::join!(producer, consumer);

    state.pool.unregister(connection_id);
    tracing::info!(connection_id, "front-end connection closed");
}
