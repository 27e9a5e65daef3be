//! Room directory: the authoritative record of who is connected, to which
//! room, under which display name.
//!
//! Rooms are created lazily on first join and removed when the last member
//! leaves. The directory is owned by [`crate::state::AppState`] rather than
//! living in a module-level global, so tests instantiate isolated copies.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use rehearsal_shared::protocol::{RoomUser, ServerMessage};

/// Errors from unicast delivery attempts.
///
/// Broadcast paths never surface these; they degrade to per-recipient log
/// lines and nothing is ever raised toward a client.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    #[error("user '{user_id}' not found in room '{room_id}'")]
    UserNotFound { room_id: String, user_id: String },

    #[error("connection channel for '{0}' is closed")]
    ChannelClosed(String),
}

/// One registered connection inside a room.
struct Member {
    /// Outbound channel drained by the connection's pusher task.
    sender: mpsc::UnboundedSender<String>,
    nickname: String,
}

type Room = HashMap<String, Member>;

/// `roomId -> (userId -> member)` map guarded by a single lock.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user_id` in `room_id`, creating the room if absent.
    ///
    /// The joining connection immediately receives a `room-users` roster
    /// (itself included, sorted by user id) and every other member gets a
    /// `user-joined` event. Both happen under one lock acquisition so the
    /// roster and the delta stay consistent. A join reusing an existing
    /// user id silently replaces the previous entry; the superseded socket
    /// is left open.
    pub async fn join(
        &self,
        room_id: &str,
        user_id: &str,
        nickname: &str,
        sender: mpsc::UnboundedSender<String>,
    ) {
        let mut rooms = self.rooms.lock().await;
        let room = rooms.entry(room_id.to_string()).or_default();

        let member = Member {
            sender: sender.clone(),
            nickname: nickname.to_string(),
        };
        if room.insert(user_id.to_string(), member).is_some() {
            tracing::warn!(
                "user '{}' rejoined room '{}', replacing the previous entry",
                user_id,
                room_id
            );
        }

        let mut users: Vec<RoomUser> = room
            .iter()
            .map(|(id, m)| RoomUser {
                user_id: id.clone(),
                nickname: m.nickname.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let roster = ServerMessage::RoomUsers {
            room_id: room_id.to_string(),
            users,
        };
        if sender.send(roster.to_json()).is_err() {
            tracing::warn!("failed to send room-users to '{}'", user_id);
        }

        let joined = ServerMessage::UserJoined {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
        };
        send_to_room(room, &joined.to_json(), Some(user_id));

        tracing::info!(
            "user '{}' ('{}') joined room '{}' ({} members)",
            user_id,
            nickname,
            room_id,
            room.len()
        );
    }

    /// Remove `user_id` from `room_id` after its socket closed.
    ///
    /// Deletes the room when it empties, otherwise tells the remaining
    /// members via `user-left`. Unknown rooms and users are no-ops.
    pub async fn leave(&self, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().await;

        let room_now_empty = {
            let Some(room) = rooms.get_mut(room_id) else {
                return;
            };
            room.remove(user_id);
            room.is_empty()
        };

        if room_now_empty {
            rooms.remove(room_id);
            tracing::info!("room '{}' is empty and was removed", room_id);
        } else if let Some(room) = rooms.get(room_id) {
            let left = ServerMessage::UserLeft {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            };
            send_to_room(room, &left.to_json(), None);
            tracing::info!(
                "user '{}' left room '{}' ({} members remain)",
                user_id,
                room_id,
                room.len()
            );
        }
    }

    /// Forward an opaque negotiation payload to exactly one room member.
    ///
    /// `data` is passed through unchanged; only `fromUserId` is substituted
    /// into the delivered envelope.
    pub async fn relay_signal(
        &self,
        room_id: &str,
        target_user_id: &str,
        from_user_id: &str,
        data: Value,
    ) -> Result<(), RelayError> {
        let rooms = self.rooms.lock().await;
        let room = rooms
            .get(room_id)
            .ok_or_else(|| RelayError::RoomNotFound(room_id.to_string()))?;
        let target = room
            .get(target_user_id)
            .ok_or_else(|| RelayError::UserNotFound {
                room_id: room_id.to_string(),
                user_id: target_user_id.to_string(),
            })?;

        let forwarded = ServerMessage::Signal {
            from_user_id: from_user_id.to_string(),
            data,
        };
        target
            .sender
            .send(forwarded.to_json())
            .map_err(|_| RelayError::ChannelClosed(target_user_id.to_string()))
    }

    /// Send `message` to every member of `room_id`, skipping `except` when
    /// given. A missing room is a silent no-op.
    pub async fn broadcast(&self, room_id: &str, message: &ServerMessage, except: Option<&str>) {
        let rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(room_id) else {
            tracing::debug!("broadcast to unknown room '{}' dropped", room_id);
            return;
        };
        send_to_room(room, &message.to_json(), except);
    }

    /// Number of rooms currently alive.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Member count of `room_id`, or `None` if the room does not exist.
    pub async fn member_count(&self, room_id: &str) -> Option<usize> {
        self.rooms.lock().await.get(room_id).map(Room::len)
    }
}

/// Fire-and-forget fan-out. One failing recipient never aborts delivery to
/// the rest.
fn send_to_room(room: &Room, payload: &str, except: Option<&str>) {
    for (user_id, member) in room {
        if except == Some(user_id.as_str()) {
            continue;
        }
        if member.sender.send(payload.to_string()).is_err() {
            tracing::warn!("failed to send to user '{}', skipping", user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn join(
        directory: &RoomDirectory,
        room_id: &str,
        user_id: &str,
        nickname: &str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        directory.join(room_id, user_id, nickname, tx).await;
        rx
    }

    fn next_message(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMessage {
        let raw = rx.try_recv().expect("expected a queued message");
        serde_json::from_str(&raw).expect("expected a valid server message")
    }

    fn assert_silent(rx: &mut mpsc::UnboundedReceiver<String>) {
        assert!(rx.try_recv().is_err(), "expected no queued message");
    }

    #[tokio::test]
    async fn test_first_join_creates_room_and_returns_roster() {
        // テスト項目: 最初の join で部屋が作られ、自分を含む roster が返る
        // given (前提条件):
        let directory = RoomDirectory::new();

        // when (操作):
        let mut rx = join(&directory, "r1", "u1", "Mina").await;

        // then (期待する結果):
        assert_eq!(directory.room_count().await, 1);
        assert_eq!(directory.member_count("r1").await, Some(1));
        assert_eq!(
            next_message(&mut rx),
            ServerMessage::RoomUsers {
                room_id: "r1".to_string(),
                users: vec![RoomUser {
                    user_id: "u1".to_string(),
                    nickname: "Mina".to_string(),
                }],
            }
        );
        assert_silent(&mut rx);
    }

    #[tokio::test]
    async fn test_second_join_notifies_existing_member() {
        // テスト項目: 2 人目の join で既存メンバーに user-joined が届き、
        //             参加者には全員分の roster が届く
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut rx1 = join(&directory, "r1", "u1", "Mina").await;
        let _ = next_message(&mut rx1); // roster for u1

        // when (操作):
        let mut rx2 = join(&directory, "r1", "u2", "Theo").await;

        // then (期待する結果):
        assert_eq!(
            next_message(&mut rx1),
            ServerMessage::UserJoined {
                room_id: "r1".to_string(),
                user_id: "u2".to_string(),
                nickname: "Theo".to_string(),
            }
        );
        match next_message(&mut rx2) {
            ServerMessage::RoomUsers { users, .. } => {
                let ids: Vec<&str> = users.iter().map(|u| u.user_id.as_str()).collect();
                assert_eq!(ids, vec!["u1", "u2"]); // sorted by user id
            }
            other => panic!("unexpected message: {other:?}"),
        }
        // The joiner does not receive its own user-joined event.
        assert_silent(&mut rx2);
    }

    #[tokio::test]
    async fn test_duplicate_join_replaces_entry_without_growing_room() {
        // テスト項目: 同じ userId の再 join は既存エントリを置き換え、
        //             以後の配送は新しい接続にのみ届く
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut old_rx = join(&directory, "r1", "u1", "Mina").await;
        let _ = next_message(&mut old_rx);

        // when (操作):
        let mut new_rx = join(&directory, "r1", "u1", "Mina-laptop").await;
        let _ = next_message(&mut new_rx); // roster

        // then (期待する結果):
        assert_eq!(directory.member_count("r1").await, Some(1));
        let chat = ServerMessage::Chat {
            room_id: "r1".to_string(),
            user_id: "u2".to_string(),
            text: "hi".to_string(),
            timestamp: 1000,
        };
        directory.broadcast("r1", &chat, None).await;
        assert_eq!(next_message(&mut new_rx), chat);
        assert_silent(&mut old_rx);
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_members() {
        // テスト項目: 退出時に残りのメンバーへ user-left が届き、部屋は残る
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut rx1 = join(&directory, "r1", "u1", "Mina").await;
        let mut rx2 = join(&directory, "r1", "u2", "Theo").await;
        let _ = next_message(&mut rx1);
        let _ = next_message(&mut rx1); // user-joined u2
        let _ = next_message(&mut rx2);

        // when (操作):
        directory.leave("r1", "u1").await;

        // then (期待する結果):
        assert_eq!(
            next_message(&mut rx2),
            ServerMessage::UserLeft {
                room_id: "r1".to_string(),
                user_id: "u1".to_string(),
            }
        );
        assert_eq!(directory.member_count("r1").await, Some(1));
    }

    #[tokio::test]
    async fn test_last_leave_removes_room() {
        // テスト項目: 最後のメンバーが退出すると部屋そのものが消える
        // given (前提条件):
        let directory = RoomDirectory::new();
        let _rx = join(&directory, "r1", "u1", "Mina").await;

        // when (操作):
        directory.leave("r1", "u1").await;

        // then (期待する結果):
        assert_eq!(directory.room_count().await, 0);
        assert_eq!(directory.member_count("r1").await, None);
    }

    #[tokio::test]
    async fn test_leave_for_unknown_room_is_a_no_op() {
        // テスト項目: 存在しない部屋からの退出は何も起こさない
        // given (前提条件):
        let directory = RoomDirectory::new();
        let _rx = join(&directory, "r1", "u1", "Mina").await;

        // when (操作):
        directory.leave("nope", "u1").await;
        directory.leave("r1", "ghost").await;

        // then (期待する結果):
        assert_eq!(directory.member_count("r1").await, Some(1));
    }

    #[tokio::test]
    async fn test_relay_signal_delivers_payload_verbatim() {
        // テスト項目: signal の data が改変されず宛先 1 人にだけ届く
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut rx1 = join(&directory, "r1", "u1", "Mina").await;
        let mut rx2 = join(&directory, "r1", "u2", "Theo").await;
        let _ = next_message(&mut rx1);
        let _ = next_message(&mut rx1);
        let _ = next_message(&mut rx2);
        let payload = json!({"type": "offer", "sdp": "abc"});

        // when (操作):
        let result = directory
            .relay_signal("r1", "u2", "u1", payload.clone())
            .await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(
            next_message(&mut rx2),
            ServerMessage::Signal {
                from_user_id: "u1".to_string(),
                data: payload,
            }
        );
        assert_silent(&mut rx1);
    }

    #[tokio::test]
    async fn test_relay_signal_to_absent_target_is_an_error_but_delivers_nothing() {
        // テスト項目: 部屋にいない宛先への signal はエラーになり、誰にも届かない
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut rx1 = join(&directory, "r1", "u1", "Mina").await;
        let _ = next_message(&mut rx1);

        // when (操作):
        let missing_user = directory
            .relay_signal("r1", "ghost", "u1", json!({"type": "offer"}))
            .await;
        let missing_room = directory
            .relay_signal("nope", "u1", "u1", json!({"type": "offer"}))
            .await;

        // then (期待する結果):
        assert!(matches!(missing_user, Err(RelayError::UserNotFound { .. })));
        assert!(matches!(missing_room, Err(RelayError::RoomNotFound(_))));
        assert_silent(&mut rx1);
    }

    #[tokio::test]
    async fn test_broadcast_with_exclusion_skips_the_sender() {
        // テスト項目: except 指定付きブロードキャストは送信者を除外する
        // given (前提条件):
        let directory = RoomDirectory::new();
        let mut rx1 = join(&directory, "r1", "u1", "Mina").await;
        let mut rx2 = join(&directory, "r1", "u2", "Theo").await;
        let _ = next_message(&mut rx1);
        let _ = next_message(&mut rx1);
        let _ = next_message(&mut rx2);
        let msg = ServerMessage::Metronome {
            room_id: "r1".to_string(),
            running: true,
            bpm: 96.0,
            time_signature: 4,
            start_time: 1000,
        };

        // when (操作):
        directory.broadcast("r1", &msg, Some("u1")).await;

        // then (期待する結果):
        assert_eq!(next_message(&mut rx2), msg);
        assert_silent(&mut rx1);
    }

    #[tokio::test]
    async fn test_broadcast_survives_a_dead_recipient() {
        // テスト項目: 受信側が死んでいても他のメンバーへの配送は続く
        // given (前提条件):
        let directory = RoomDirectory::new();
        let dead_rx = join(&directory, "r1", "u1", "Mina").await;
        drop(dead_rx);
        let mut rx2 = join(&directory, "r1", "u2", "Theo").await;
        let _ = next_message(&mut rx2);
        let msg = ServerMessage::Chat {
            room_id: "r1".to_string(),
            user_id: "u2".to_string(),
            text: "still here".to_string(),
            timestamp: 2000,
        };

        // when (操作):
        directory.broadcast("r1", &msg, None).await;

        // then (期待する結果):
        assert_eq!(next_message(&mut rx2), msg);
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_room_is_a_no_op() {
        // テスト項目: 存在しない部屋へのブロードキャストは黙って捨てられる
        // given (前提条件):
        let directory = RoomDirectory::new();
        let msg = ServerMessage::Chat {
            room_id: "nope".to_string(),
            user_id: "u1".to_string(),
            text: "anyone?".to_string(),
            timestamp: 1000,
        };

        // when (操作):
        directory.broadcast("nope", &msg, None).await;

        // then (期待する結果):
        assert_eq!(directory.room_count().await, 0);
    }
}
