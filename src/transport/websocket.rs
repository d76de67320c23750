//! WebSocket transport
//!
//! This file implements the WebSocket server that translates protocol JSON
//! messages into broker operations. Responsibilities:
//! - Accept TCP/WebSocket connections, up to `max_connections` at a time
//! - Require a `connect` frame first and open the user's session with it
//! - Run a writer task per connection that forwards both request replies and
//!   the user's delivery channel to the socket
//! - Call `Broker::unsubscribe_all` exactly once when the connection ends,
//!   whichever side ends it

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Broker;
use crate::broker::message::Message;
use crate::config::Settings;
use crate::transport::handler;
use crate::transport::message::{ClientMessage, ServerMessage};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

pub async fn start_websocket_server(
    addr: &str,
    broker: Arc<Broker>,
    settings: Settings,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, broker, settings.broker.max_connections).await;
    Ok(())
}

/// Accept connections on an already bound listener until accepting fails.
pub async fn serve(listener: TcpListener, broker: Arc<Broker>, max_connections: usize) {
    let active = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {e}");
                return;
            }
        };
        let broker = broker.clone();
        let active = active.clone();

        spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake error from {peer}: {e}");
                    return;
                }
            };

            if active.fetch_add(1, Ordering::SeqCst) >= max_connections {
                warn!("Rejecting {peer}: connection limit {max_connections} reached");
                let (mut ws_sender, _) = ws_stream.split();
                let _ = send_frame(&mut ws_sender, &ServerMessage::error("server is full")).await;
                let _ = ws_sender.close().await;
            } else {
                handle_connection(ws_stream, broker).await;
            }

            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

async fn handle_connection(ws_stream: WebSocketStream<TcpStream>, broker: Arc<Broker>) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let Some((username, deliveries)) = open_session(&broker, &mut ws_sender, &mut ws_receiver).await
    else {
        let _ = ws_sender.close().await;
        return;
    };

    let cleanup_called = Arc::new(AtomicBool::new(false));

    let do_cleanup = {
        let broker = broker.clone();
        let username = username.clone();
        let cleanup_called = cleanup_called.clone();

        move || {
            if !cleanup_called.swap(true, Ordering::SeqCst) {
                broker.unsubscribe_all(&username);
            }
        }
    };

    let (replies_tx, replies_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = spawn(write_loop(
        ws_sender,
        replies_rx,
        deliveries,
        username.clone(),
        do_cleanup.clone(),
    ));

    while let Some(Ok(frame)) = ws_receiver.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(request) => handler::dispatch(&broker, &username, request).await,
            Err(err) => {
                warn!(
                    "Invalid client message from {username}: {err} | {}",
                    text.as_str().chars().take(100).collect::<String>()
                );
                ServerMessage::error("invalid request")
            }
        };

        if replies_tx.send(reply).is_err() {
            break;
        }
    }

    info!("User {username} disconnected");
    do_cleanup();
    drop(replies_tx);

    if let Err(e) = writer.await {
        error!("Writer task for {username} failed: {e}");
    }
}

/// Wait for the `connect` frame and register the user with the broker.
async fn open_session(
    broker: &Broker,
    ws_sender: &mut WsSink,
    ws_receiver: &mut WsSource,
) -> Option<(String, Receiver<Message>)> {
    while let Some(Ok(frame)) = ws_receiver.next().await {
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => return None,
            _ => continue,
        };

        let outcome = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Connect { username }) => handler::connect(broker, &username)
                .map(|deliveries| (username, deliveries))
                .map_err(|e| e.to_string()),
            Ok(_) => Err("must connect first".to_string()),
            Err(_) => Err("invalid request".to_string()),
        };

        return match outcome {
            Ok((username, deliveries)) => {
                let reply = ServerMessage::Connected {
                    username: username.clone(),
                };
                if let Err(e) = send_frame(ws_sender, &reply).await {
                    warn!("Lost {username} before the session started: {e}");
                    broker.unsubscribe_all(&username);
                    return None;
                }
                Some((username, deliveries))
            }
            Err(message) => {
                warn!("Refused session: {message}");
                let _ = send_frame(ws_sender, &ServerMessage::error(message)).await;
                None
            }
        };
    }

    None
}

/// Forward replies and delivered chat messages to the socket.
///
/// Ends when the delivery channel closes (the session was cleaned up) or the
/// socket stops accepting frames.
async fn write_loop(
    mut ws_sender: WsSink,
    mut replies: UnboundedReceiver<ServerMessage>,
    mut deliveries: Receiver<Message>,
    username: String,
    do_cleanup: impl FnOnce(),
) {
    loop {
        let frame = tokio::select! {
            biased;
            Some(reply) = replies.recv() => reply,
            delivery = deliveries.recv() => match delivery {
                Some(msg) => ServerMessage::from(msg),
                None => break,
            },
        };

        if let Err(e) = send_frame(&mut ws_sender, &frame).await {
            warn!("Failed to send message to {username}: {e}");
            break;
        }
    }

    do_cleanup();
    let _ = ws_sender.close().await;
    info!("Send loop closed for {username}");
}

async fn send_frame(ws_sender: &mut WsSink, msg: &ServerMessage) -> Result<(), tungstenite::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => ws_sender.send(WsMessage::text(json)).await,
        Err(e) => {
            error!("Failed to serialize message: {e}");
            Ok(())
        }
    }
}
