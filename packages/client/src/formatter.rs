//! Message formatting utilities for client display.

use rehearsal_shared::protocol::RoomUser;
use rehearsal_shared::time::timestamp_to_rfc3339;

use crate::{
    latency::LatencyStats, metronome::MetronomeSettings, recording::RecordingPhase, takes::Take,
};

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the room roster showing all members.
    ///
    /// # Arguments
    ///
    /// * `users` - Current members of the room
    /// * `current_user_id` - The current user's id (to mark as "me")
    pub fn format_room_users(users: &[RoomUser], current_user_id: &str) -> String {
        let mut output = String::new();
        output.push_str("\n\n============================================================\n");
        output.push_str("In the room:\n");

        if users.is_empty() {
            output.push_str("(nobody)\n");
        } else {
            for user in users {
                let me_suffix = if user.user_id == current_user_id {
                    " (me)"
                } else {
                    ""
                };
                output.push_str(&format!("{} [{}]{}\n", user.nickname, user.user_id, me_suffix));
            }
        }

        output.push_str("============================================================\n");
        output
    }

    /// Format a user-joined notification
    pub fn format_user_joined(user_id: &str, nickname: &str) -> String {
        format!("\n+ {} [{}] joined the room\n", nickname, user_id)
    }

    /// Format a user-left notification
    pub fn format_user_left(user_id: &str) -> String {
        format!("\n- {} left the room\n", user_id)
    }

    /// Format a chat message; the sender's own echo renders through the
    /// same path, marked by `is_me`.
    pub fn format_chat_message(user_id: &str, text: &str, sent_at_ms: i64, is_me: bool) -> String {
        let who = if is_me {
            format!("{} (me)", user_id)
        } else {
            user_id.to_string()
        };
        format!(
            "\n@{}: {}\n  sent at {}\n",
            who,
            text,
            timestamp_to_rfc3339(sent_at_ms)
        )
    }

    /// Format the shared metronome state
    pub fn format_metronome(settings: &MetronomeSettings) -> String {
        if settings.running {
            format!(
                "\n♩ Metronome running: {} BPM, {} beats per bar\n",
                settings.bpm, settings.time_signature
            )
        } else {
            "\n♩ Metronome stopped\n".to_string()
        }
    }

    /// Format a recording session transition
    pub fn format_recording_state(phase: &RecordingPhase, current_user_id: &str) -> String {
        let name = |recorder: &str| {
            if recorder == current_user_id {
                "you".to_string()
            } else {
                recorder.to_string()
            }
        };
        match phase {
            RecordingPhase::Idle => "\n○ Recording session is idle\n".to_string(),
            RecordingPhase::CountIn { recorder } => {
                format!("\n… Count-in started by {}\n", name(recorder))
            }
            RecordingPhase::Recording { recorder } => {
                format!("\n● {} recording a take\n", name(recorder))
            }
            RecordingPhase::Saving { recorder } => {
                format!("\n◌ {} saving the take\n", name(recorder))
            }
        }
    }

    /// Format latency statistics the way the latency panel shows them
    pub fn format_latency(stats: Option<&LatencyStats>) -> String {
        match stats {
            None => "Latency: -- (no samples yet)\n".to_string(),
            Some(s) => format!(
                "Avg: {:.1} ms · Min: {:.1} · Max: {:.1} · Jitter: {:.1} ms ({} samples)\n",
                s.average_ms, s.min_ms, s.max_ms, s.jitter_ms, s.samples
            ),
        }
    }

    /// Format the local take log
    pub fn format_takes(takes: &[Take]) -> String {
        if takes.is_empty() {
            return "No takes recorded this session.\n".to_string();
        }
        let mut output = String::new();
        for take in takes {
            let duration = match take.duration_ms {
                Some(ms) => format!("{:.1} s", ms as f64 / 1000.0),
                None => "in progress".to_string(),
            };
            output.push_str(&format!(
                "Take {} – {} – {} BPM – {}\n",
                take.number, take.room_id, take.bpm, duration
            ));
        }
        output
    }
}
