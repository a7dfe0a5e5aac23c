use crate::command;
use crate::config::Config;
use crate::connection::Session;
use crate::persistence::aof::{self, SharedAof};
use crate::resp::{RespError, RespParser, RespValue};
use crate::store::SharedStore;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

pub async fn run_server(store: SharedStore, aof: SharedAof, config: &Config) -> std::io::Result<()> {
    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("emberkv listening on {addr}");

    let store_clone = store.clone();
    let aof_clone = aof.clone();
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        expiration_sweep_loop(store_clone, aof_clone, sweep_interval).await;
    });

    let aof_clone = aof.clone();
    let fsync_interval = config.fsync_interval;
    tokio::spawn(async move {
        aof_fsync_loop(aof_clone, fsync_interval).await;
    });

    // Accept loop with graceful shutdown on ctrl-c
    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                let store = store.clone();
                let aof = aof.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, store, aof).await {
                        debug!("Connection error from {peer_addr}: {e}");
                    }
                    debug!("Connection closed: {peer_addr}");
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                if let Err(e) = aof.flush_once().await {
                    warn!("Final AOF flush failed: {e}");
                }
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    store: SharedStore,
    aof: SharedAof,
) -> std::io::Result<()> {
    let mut session = Session::new();
    let mut buf = BytesMut::with_capacity(4096);
    debug!(session = session.id, "connection opened");

    loop {
        // Serve every complete request already buffered
        loop {
            match RespParser::parse(&mut buf) {
                Ok(Some(frame)) => {
                    let response = command::execute(&frame, &store, &mut session, &aof).await;
                    stream.write_all(&response.serialize()).await?;

                    if session.should_close {
                        return Ok(());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(session = session.id, "protocol error: {e}");
                    let err_resp = RespValue::error(format!("ERR Protocol error: {e}"));
                    stream.write_all(&err_resp.serialize()).await?;
                    return Ok(());
                }
            }
        }

        if stream.read_buf(&mut buf).await? == 0 {
            // A clean disconnect only happens between frames
            if buf.is_empty() {
                return Ok(());
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                RespError::Truncated,
            ));
        }
    }
}

/// Background task that periodically removes expired keys and logs their
/// deletion.
async fn expiration_sweep_loop(store: SharedStore, aof: SharedAof, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let removed = store.sweep_once().await;
        if removed > 0 {
            info!("Expiration sweep removed {removed} keys");
        }
        aof::log_expired(&store, &aof).await;
    }
}

/// Background task that flushes the AOF on a fixed interval.
async fn aof_fsync_loop(aof: SharedAof, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = aof.flush_once().await {
            warn!("AOF flush failed: {e}");
        }
    }
}
