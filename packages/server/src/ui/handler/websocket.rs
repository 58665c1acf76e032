//! WebSocket connection handlers.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;

use crate::{
    domain::{CallDetails, ConnectionId, LiveInfo, SignalKind},
    infrastructure::dto::websocket::{ClientEvent, SignalData},
    ui::state::AppState,
    usecase::{FileMessage, PrivateMessage},
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that receives messages from the rx channel and pushes them to the WebSocket sender.
///
/// This function handles the outbound message flow: events produced by the use cases
/// (via rx channel) are sent to this connection's WebSocket.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    })
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();

    // Create a channel for this connection to receive events
    let (tx, rx) = mpsc::unbounded_channel();
    let connection = state.connect_usecase.connect(tx).await;
    tracing::info!("Connection '{}' accepted", connection);

    let state_clone = state.clone();

    // Spawn a task to receive events from this connection
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("WebSocket error on '{}': {}", connection, e);
                    break;
                }
            };

            match msg {
                Message::Text(text) => match ClientEvent::parse(&text) {
                    Ok(event) => handle_event(&state_clone, connection, event).await,
                    Err(e) => {
                        tracing::warn!("Dropping malformed event from '{}': {}", connection, e);
                    }
                },
                Message::Ping(_) => {
                    tracing::debug!("Received ping");
                    // Ping/pong is handled automatically by the WebSocket protocol
                }
                Message::Close(_) => {
                    tracing::info!("Connection '{}' requested close", connection);
                    break;
                }
                _ => {}
            }
        }
    });

    // Spawn a task to push events to this connection
    let mut send_task = pusher_loop(rx, sender);

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // Tear down everything the connection held
    state.disconnect_usecase.execute(connection).await;
}

/// Routes one inbound event to its use case.
///
/// Failures are reported to the client by the use cases themselves where the
/// protocol has an event for it; everything else is only logged.
async fn handle_event(state: &AppState, connection: ConnectionId, event: ClientEvent) {
    match event {
        ClientEvent::RegisterUser(payload) => {
            if let Err(e) = state
                .connect_usecase
                .register(connection, payload.into_user_id())
                .await
            {
                tracing::warn!("Register from '{}' failed: {}", connection, e);
            }
        }
        ClientEvent::JoinRoom {
            room_id,
            user_info,
            micro_on,
            kind,
        } => {
            // microOn は省略時 true
            if let Err(e) = state
                .room_session_usecase
                .join(connection, room_id, kind, user_info, micro_on.unwrap_or(true))
                .await
            {
                tracing::warn!("Join from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::LeaveRoom { room_id } => {
            state.room_session_usecase.leave(connection, room_id).await;
        }
        ClientEvent::UpdateMicro { room_id, micro_on } => {
            state
                .room_session_usecase
                .update_microphone(connection, room_id, micro_on)
                .await;
        }
        ClientEvent::RoomMessage {
            room_id,
            message,
            files,
        } => {
            let text = message.unwrap_or_default();
            if text.trim().is_empty() && files.is_empty() {
                tracing::warn!("Dropping empty room message from '{}'", connection);
                return;
            }
            if let Err(e) = state
                .room_session_usecase
                .send_message(connection, room_id, text, files)
                .await
            {
                tracing::warn!("Room message from '{}' dropped: {}", connection, e);
            }
        }

        ClientEvent::Offer(data) => relay(state, connection, SignalKind::Offer, data).await,
        ClientEvent::Answer(data) => relay(state, connection, SignalKind::Answer, data).await,
        ClientEvent::IceCandidate(data) => {
            relay(state, connection, SignalKind::IceCandidate, data).await
        }
        ClientEvent::OfferLive(data) => relay(state, connection, SignalKind::OfferLive, data).await,
        ClientEvent::AnswerLive(data) => {
            relay(state, connection, SignalKind::AnswerLive, data).await
        }
        ClientEvent::IceCandidateLive(data) => {
            relay(state, connection, SignalKind::IceCandidateLive, data).await
        }

        ClientEvent::CallUser {
            to_user_id,
            call_type,
            room_id,
            from_user,
        } => {
            let details = CallDetails {
                call_type,
                room_id,
                caller_info: from_user,
            };
            if let Err(e) = state
                .call_usecase
                .call_user(connection, to_user_id, details)
                .await
            {
                tracing::warn!("Call from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::AcceptCall { from_user_id } => {
            if let Err(e) = state.call_usecase.accept(connection, from_user_id).await {
                tracing::warn!("Accept from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::RejectCall { from_user_id } => {
            if let Err(e) = state.call_usecase.reject(connection, from_user_id).await {
                tracing::warn!("Reject from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::CancelCall { to_user_id } => {
            if let Err(e) = state.call_usecase.cancel(connection, to_user_id).await {
                tracing::warn!("Cancel from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::EndCall { user_id } => {
            if let Err(e) = state.call_usecase.end(connection, user_id).await {
                tracing::warn!("End call from '{}' refused: {}", connection, e);
            }
        }

        ClientEvent::SendPrivateMessage {
            to_user_id,
            from_user_id,
            message,
            files,
            msg_id,
            reply_to,
        } => {
            let message = PrivateMessage {
                claimed_from: from_user_id,
                text: message,
                files,
                msg_id,
                reply_to,
            };
            if let Err(e) = state
                .chat_usecase
                .send_private_message(connection, to_user_id, message)
                .await
            {
                tracing::warn!("Private message from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::SendFile {
            to_user_id,
            from_user_id,
            file,
            file_name,
            mime_type,
            msg_id,
            preview,
            reply_to,
        } => {
            let file = FileMessage {
                claimed_from: from_user_id,
                file,
                file_name,
                mime_type,
                msg_id,
                preview,
                reply_to,
            };
            if let Err(e) = state.chat_usecase.send_file(connection, to_user_id, file).await {
                tracing::warn!("File from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::EditMessage {
            to_user_id,
            message_id,
            content,
        } => {
            if let Err(e) = state
                .chat_usecase
                .edit_message(connection, to_user_id, message_id, content)
                .await
            {
                tracing::warn!("Edit from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::DeleteMessage {
            to_user_id,
            message_id,
        } => {
            if let Err(e) = state
                .chat_usecase
                .delete_message(connection, to_user_id, message_id)
                .await
            {
                tracing::warn!("Delete from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::Typing { to_user_id } => {
            if let Err(e) = state.chat_usecase.typing(connection, to_user_id, true).await {
                tracing::debug!("Typing from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::StopTyping { to_user_id } => {
            if let Err(e) = state.chat_usecase.typing(connection, to_user_id, false).await {
                tracing::debug!("Stop-typing from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::MarkMessagesRead { to_user_id } => {
            if let Err(e) = state.chat_usecase.mark_read(connection, to_user_id).await {
                tracing::warn!("Mark-read from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::BroadcastMessage { content } => {
            if let Err(e) = state.chat_usecase.broadcast(connection, content).await {
                tracing::warn!("Broadcast from '{}' dropped: {}", connection, e);
            }
        }
        ClientEvent::NewMessage(message) => {
            state.chat_usecase.relay_public(connection, message).await;
        }

        ClientEvent::NewNotification {
            to_user_id,
            kind,
            payload,
        } => {
            state
                .notification_usecase
                .notify(&to_user_id, kind, payload)
                .await;
        }
        ClientEvent::UpdateFriends { to_user_id } => {
            state
                .notification_usecase
                .update_friends(to_user_id.as_ref())
                .await;
        }
        ClientEvent::UnreadMessagesCount { to_user_id, unread } => {
            state
                .notification_usecase
                .unread_messages_count(connection, &to_user_id, unread)
                .await;
        }

        ClientEvent::NewFriendRequest { to_user_id, count } => {
            state
                .notification_usecase
                .new_friend_request(&to_user_id, count)
                .await;
        }

        ClientEvent::LiveCreate {
            live_id,
            title,
            kind,
            user_info,
        } => {
            let info = LiveInfo { title, kind };
            if let Err(e) = state
                .live_usecase
                .create(connection, live_id, info, user_info)
                .await
            {
                tracing::warn!("Live create from '{}' failed: {}", connection, e);
            }
        }
        ClientEvent::JoinLive { live_id, user_info } => {
            if let Err(e) = state.live_usecase.join(connection, live_id, user_info).await {
                tracing::warn!("Live join from '{}' refused: {}", connection, e);
            }
        }
        ClientEvent::LeaveLive { live_id } => {
            state.live_usecase.leave(connection, live_id).await;
        }
        ClientEvent::LiveStop { live_id } => {
            if let Err(e) = state.live_usecase.stop(connection, live_id).await {
                tracing::warn!("Live stop from '{}' refused: {}", connection, e);
            }
        }
    }
}

async fn relay(state: &AppState, connection: ConnectionId, kind: SignalKind, mut data: SignalData) {
    let Some(target) = data.target() else {
        tracing::warn!("Dropping {:?} from '{}' without a target", kind, connection);
        return;
    };
    let Some(payload) = data.take_payload(kind) else {
        tracing::warn!("Dropping {:?} from '{}' without a payload", kind, connection);
        return;
    };
    state
        .signaling_usecase
        .relay(connection, kind, target, payload)
        .await;
}
