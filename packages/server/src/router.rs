//! Per-message-type dispatch for inbound envelopes.

use tokio::sync::mpsc;

use rehearsal_shared::protocol::{ClientMessage, ServerMessage};

use crate::state::{AppState, ConnIdentity};

/// Display name used when a join carries no nickname.
pub const DEFAULT_NICKNAME: &str = "Anonymous";

/// Dispatch one parsed envelope from a connection.
///
/// `reply` is the connection's own outbound channel, used for the unicast
/// replies (`room-users`, `pong`). Referential misses are logged and
/// dropped; nothing is ever raised toward the client as an error message.
pub async fn route_message(
    state: &AppState,
    identity: &mut ConnIdentity,
    reply: &mpsc::UnboundedSender<String>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Join {
            room_id,
            user_id,
            nickname,
        } => {
            if room_id.is_empty() || user_id.is_empty() {
                tracing::warn!("dropping join with empty room or user id");
                return;
            }
            let nickname = nickname
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| DEFAULT_NICKNAME.to_string());

            identity.room_id = Some(room_id.clone());
            identity.user_id = Some(user_id.clone());
            identity.nickname = Some(nickname.clone());

            state
                .directory
                .join(&room_id, &user_id, &nickname, reply.clone())
                .await;
        }

        ClientMessage::Signal {
            room_id,
            target_user_id,
            from_user_id,
            data,
        } => {
            // The payload stays opaque; the discriminator is only for logs.
            let kind = data.get("type").and_then(|v| v.as_str()).unwrap_or("?");
            tracing::debug!(
                "relaying '{}' signal from '{}' to '{}' in room '{}'",
                kind,
                from_user_id,
                target_user_id,
                room_id
            );
            if let Err(e) = state
                .directory
                .relay_signal(&room_id, &target_user_id, &from_user_id, data)
                .await
            {
                tracing::debug!("signal dropped: {}", e);
            }
        }

        ClientMessage::Chat {
            room_id,
            user_id,
            text,
            timestamp,
        } => {
            // Echoed to the sender too, so one rendering path on every
            // client handles all chat messages.
            let chat = ServerMessage::Chat {
                room_id: room_id.clone(),
                user_id,
                text,
                timestamp,
            };
            state.directory.broadcast(&room_id, &chat, None).await;
        }

        ClientMessage::Metronome {
            room_id,
            running,
            bpm,
            time_signature,
            start_time,
        } => {
            // The sender already applied this locally; only others need it.
            let metronome = ServerMessage::Metronome {
                room_id: room_id.clone(),
                running,
                bpm,
                time_signature,
                start_time,
            };
            state
                .directory
                .broadcast(&room_id, &metronome, identity.user_id.as_deref())
                .await;
        }

        ClientMessage::RecordingState {
            room_id,
            state: session_state,
            recorder_id,
            timestamp,
        } => {
            let transition = ServerMessage::RecordingState {
                room_id: room_id.clone(),
                state: session_state,
                recorder_id,
                timestamp,
            };
            state
                .directory
                .broadcast(&room_id, &transition, identity.user_id.as_deref())
                .await;
        }

        ClientMessage::Ping { client_time } => {
            let pong = ServerMessage::Pong {
                client_time,
                server_time: state.clock.now_millis(),
            };
            if reply.send(pong.to_json()).is_err() {
                tracing::warn!("failed to queue pong reply");
            }
        }

        ClientMessage::Unknown => {
            tracing::debug!("ignoring message with unknown type");
        }
    }
}
