//! WebSocket bridge between the browser extension and the engine.
//!
//! The extension opens one connection per browser profile and sends every message as a
//! JSON [`Envelope`](hoverlink_common::protocol::Envelope) text frame. Each frame gets
//! exactly one [`Reply`](hoverlink_common::protocol::Reply) frame back, carrying the
//! same `requestId`.

use futures::{SinkExt, StreamExt};
use hoverlink_engine::Dispatcher;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct RemoteServer {
    addr: SocketAddr,
}

/// Returned by [`RemoteServer::start`]. Dropping it leaves the server running.
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServerHandle {
    /// Stops accepting connections and closes the open ones.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl RemoteServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn start(&self, dispatcher: Dispatcher) -> Result<ServerHandle, ServerError> {
        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!("Remote Server listening on: {}", local_addr);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut accept_shutdown = shutdown_tx.subscribe();
        let conn_shutdown = shutdown_tx.clone();

        tokio::spawn(async move {
            info!("Server accept loop started");
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let (stream, peer) = match accepted {
                            Ok(conn) => conn,
                            Err(e) => {
                                error!("Accept failed: {}", e);
                                continue;
                            }
                        };
                        info!("Accepted TCP connection from: {}", peer);
                        tokio::spawn(accept_connection(
                            stream,
                            peer,
                            dispatcher.clone(),
                            conn_shutdown.subscribe(),
                        ));
                    }
                    _ = accept_shutdown.recv() => {
                        info!("Server accept loop stopped");
                        break;
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
        })
    }
}

async fn accept_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake occurred: {}", e);
            return;
        }
    };

    info!("New WebSocket connection: {}", peer);
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }

            msg = ws_receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed: {}", peer);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", peer, e);
                        break;
                    }
                    Some(Ok(other)) => {
                        debug!("Ignoring non-text frame: {:?}", other);
                        continue;
                    }
                };

                let reply = dispatcher.dispatch_text(&text).await;
                let json = match serde_json::to_string(&reply) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to serialize reply: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(json)).await {
                    error!("Failed to send message to WS: {}", e);
                    break;
                }
            }
        }
    }
}
