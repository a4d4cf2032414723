//! WebSocket connection handler
//!
//! Handles individual connections: WebSocket handshake, message
//! parsing, and bidirectional communication with the ChatServer.
//! Authentication lives outside this core: the handshake path carries
//! a user id already issued by the external auth collaborator
//! (`/ws/<uuid>`), and this handler only extracts it.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::types::UserId;

/// Channel buffer for server -> client events
const EVENT_BUFFER_SIZE: usize = 32;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, extracts the authenticated user id
/// from the request path, and manages the connection lifecycle.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake; the request path carries the user id
    let mut user_id: Option<UserId> = None;
    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        match user_id_from_path(req.uri().path()) {
            Some(id) => {
                user_id = Some(id);
                Ok(resp)
            }
            None => {
                let mut reject = ErrorResponse::new(Some("invalid user id".to_string()));
                *reject.status_mut() = StatusCode::BAD_REQUEST;
                Err(reject)
            }
        }
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Set by the callback on every accepted handshake
    let user_id = match user_id {
        Some(id) => id,
        None => return Err(AppError::ChannelSend),
    };
    info!("User {} connected from {}", user_id, peer_addr);

    // Create channel for server -> client events
    let (event_tx, mut event_rx) = mpsc::channel::<ServerMessage>(EVENT_BUFFER_SIZE);

    // Register presence with the ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            user_id,
            sender: event_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register user {} - server closed", user_id);
        return Err(AppError::ChannelSend);
    }

    // Clone cmd_tx for read task
    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (WebSocket -> ServerCommand)
    let read_task = tokio::spawn(async move {
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => {
                            let cmd = client_message_to_command(user_id, client_msg);
                            if cmd_tx_read.send(cmd).await.is_err() {
                                debug!("Server closed, ending read task for {}", user_id);
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid JSON from {}: {}", user_id, e);
                            // The server treats unparseable frames as noise;
                            // validation errors for well-formed operations come
                            // back as error frames.
                        }
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("User {} sent close frame", user_id);
                    break;
                }
                Ok(Message::Ping(data)) => {
                    debug!("Ping from {}", user_id);
                    // Pong is handled automatically by tungstenite
                    let _ = data;
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", user_id);
                }
                Ok(_) => {
                    // Binary or other message types - ignore
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", user_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", user_id);
    });

    // Spawn write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = event_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for user");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        _ = read_task => {
            debug!("Read task completed for {}", user_id);
        }
        _ = write_task => {
            debug!("Write task completed for {}", user_id);
        }
    }

    // Implicit disconnect: cancels waiting and presence, leaves any
    // active chat running for the partner.
    let _ = cmd_tx.send(ServerCommand::Disconnect { user_id }).await;

    info!("User {} disconnected", user_id);

    Ok(())
}

/// Extract the externally-authenticated user id from `/ws/<uuid>`
fn user_id_from_path(path: &str) -> Option<UserId> {
    path.strip_prefix("/ws/").and_then(UserId::parse)
}

/// Convert a ClientMessage to a ServerCommand
fn client_message_to_command(user_id: UserId, msg: ClientMessage) -> ServerCommand {
    match msg {
        ClientMessage::EnterQueue => ServerCommand::EnterQueue { user_id },
        ClientMessage::SendMessage { chat_id, content } => ServerCommand::SendMessage {
            user_id,
            chat_id,
            content,
        },
        ClientMessage::EndChat { chat_id } => ServerCommand::EndChat { user_id, chat_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_path() {
        let id = UserId::new();
        let path = format!("/ws/{}", id);
        assert_eq!(user_id_from_path(&path), Some(id));

        assert!(user_id_from_path("/ws/not-a-uuid").is_none());
        assert!(user_id_from_path("/other").is_none());
        assert!(user_id_from_path("/").is_none());
    }
}
