//! JSON message envelopes exchanged over the signaling WebSocket.
//!
//! Every logical event is one JSON object tagged by a `type` field. Field
//! names are camelCase on the wire to stay compatible with the browser
//! client. The `signal` payload is deliberately opaque: the server relays
//! it verbatim and never looks past the top-level discriminator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recording session state replicated across room members.
///
/// The server never arbitrates these; whichever client transitions the
/// session broadcasts the new state and everyone else mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    CountIn,
    Recording,
    Saving,
}

/// One room member as enumerated in a `room-users` roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUser {
    pub user_id: String,
    pub nickname: String,
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Register this connection as `userId` in `roomId`.
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        user_id: String,
        #[serde(default)]
        nickname: Option<String>,
    },
    /// Relay an opaque peer-negotiation payload to one room member.
    #[serde(rename_all = "camelCase")]
    Signal {
        room_id: String,
        target_user_id: String,
        from_user_id: String,
        data: Value,
    },
    /// Text chat, echoed back to the sender as well.
    #[serde(rename_all = "camelCase")]
    Chat {
        room_id: String,
        user_id: String,
        text: String,
        timestamp: i64,
    },
    /// Shared metronome transport state.
    #[serde(rename_all = "camelCase")]
    Metronome {
        room_id: String,
        running: bool,
        bpm: f64,
        time_signature: u32,
        start_time: i64,
    },
    /// Recording session transition asserted by a client.
    #[serde(rename_all = "camelCase")]
    RecordingState {
        room_id: String,
        state: SessionState,
        #[serde(default)]
        recorder_id: Option<String>,
        timestamp: i64,
    },
    /// Latency probe; answered with `pong` carrying both timestamps.
    #[serde(rename_all = "camelCase")]
    Ping { client_time: i64 },
    /// Any `type` this revision does not know about. Ignored on receipt so
    /// newer clients can talk to older servers.
    #[serde(other)]
    Unknown,
}

/// Messages the server delivers to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full roster sent to a client right after it joins, itself included.
    #[serde(rename_all = "camelCase")]
    RoomUsers {
        room_id: String,
        users: Vec<RoomUser>,
    },
    /// A new member joined; sent to every other member.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        room_id: String,
        user_id: String,
        nickname: String,
    },
    /// A member's connection closed; sent to the remaining members.
    #[serde(rename_all = "camelCase")]
    UserLeft { room_id: String, user_id: String },
    /// Relayed peer-negotiation payload, `data` unchanged from the sender.
    #[serde(rename_all = "camelCase")]
    Signal { from_user_id: String, data: Value },
    #[serde(rename_all = "camelCase")]
    Chat {
        room_id: String,
        user_id: String,
        text: String,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    Metronome {
        room_id: String,
        running: bool,
        bpm: f64,
        time_signature: u32,
        start_time: i64,
    },
    #[serde(rename_all = "camelCase")]
    RecordingState {
        room_id: String,
        state: SessionState,
        #[serde(default)]
        recorder_id: Option<String>,
        timestamp: i64,
    },
    #[serde(rename_all = "camelCase")]
    Pong { client_time: i64, server_time: i64 },
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Serialize to the wire representation.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these
    /// struct variants.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage serialization failed")
    }
}

impl ClientMessage {
    /// Serialize to the wire representation.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen for these
    /// struct variants.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ClientMessage serialization failed")
    }
}
