//! Client-side recording session state machine.
//!
//! Every room member mirrors the same `{state, recorder}` pair from the
//! `recording-state` broadcast stream; the server relays transitions
//! without arbitrating them. Convergence is last-broadcast-wins, made
//! precise here as: a transition whose timestamp is greater than or equal
//! to the last applied one replaces the local state.

use rehearsal_shared::protocol::SessionState;

/// Mirrored session state, tagged with the user holding record privilege.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingPhase {
    Idle,
    CountIn { recorder: String },
    Recording { recorder: String },
    Saving { recorder: String },
}

impl RecordingPhase {
    /// Build a phase from wire fields. A non-idle state without a recorder
    /// has no meaningful owner and is rejected.
    pub fn from_wire(state: SessionState, recorder_id: Option<String>) -> Option<Self> {
        match state {
            SessionState::Idle => Some(Self::Idle),
            SessionState::CountIn => recorder_id.map(|recorder| Self::CountIn { recorder }),
            SessionState::Recording => recorder_id.map(|recorder| Self::Recording { recorder }),
            SessionState::Saving => recorder_id.map(|recorder| Self::Saving { recorder }),
        }
    }

    /// Wire representation of this phase.
    pub fn wire(&self) -> (SessionState, Option<String>) {
        match self {
            Self::Idle => (SessionState::Idle, None),
            Self::CountIn { recorder } => (SessionState::CountIn, Some(recorder.clone())),
            Self::Recording { recorder } => (SessionState::Recording, Some(recorder.clone())),
            Self::Saving { recorder } => (SessionState::Saving, Some(recorder.clone())),
        }
    }

    /// The user currently holding record privilege, if any.
    pub fn recorder(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::CountIn { recorder }
            | Self::Recording { recorder }
            | Self::Saving { recorder } => Some(recorder),
        }
    }
}

/// Local mirror of the shared session state plus the transition guards.
///
/// Local transitions return `true` when they applied; the caller is then
/// responsible for broadcasting the new state with [`Self::last_transition_ms`]
/// as its timestamp.
#[derive(Debug)]
pub struct SessionTracker {
    user_id: String,
    phase: RecordingPhase,
    last_transition_ms: i64,
}

impl SessionTracker {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            phase: RecordingPhase::Idle,
            last_transition_ms: 0,
        }
    }

    pub fn phase(&self) -> &RecordingPhase {
        &self.phase
    }

    pub fn last_transition_ms(&self) -> i64 {
        self.last_transition_ms
    }

    /// Whether this client currently holds record privilege.
    pub fn is_recorder(&self) -> bool {
        self.phase.recorder() == Some(self.user_id.as_str())
    }

    /// `idle -> count_in`, taking record privilege. Refused while the
    /// session is in any other state.
    pub fn begin_count_in(&mut self, now_ms: i64) -> bool {
        if self.phase != RecordingPhase::Idle {
            return false;
        }
        self.apply(
            RecordingPhase::CountIn {
                recorder: self.user_id.clone(),
            },
            now_ms,
        );
        true
    }

    /// `count_in -> recording` once the lead-in elapsed. Guarded on the
    /// state still being our own count-in: a newer broadcast from another
    /// member cancels the pending transition.
    pub fn finish_count_in(&mut self, now_ms: i64) -> bool {
        if !self.owns_phase_count_in() {
            return false;
        }
        self.apply(
            RecordingPhase::Recording {
                recorder: self.user_id.clone(),
            },
            now_ms,
        );
        true
    }

    /// `recording -> saving`; only the recorder may stop the take.
    pub fn request_stop(&mut self, now_ms: i64) -> bool {
        let ours = matches!(&self.phase, RecordingPhase::Recording { recorder } if *recorder == self.user_id);
        if !ours {
            return false;
        }
        self.apply(
            RecordingPhase::Saving {
                recorder: self.user_id.clone(),
            },
            now_ms,
        );
        true
    }

    /// `saving -> idle` once the take has been persisted.
    pub fn finish_saving(&mut self, now_ms: i64) -> bool {
        let ours = matches!(&self.phase, RecordingPhase::Saving { recorder } if *recorder == self.user_id);
        if !ours {
            return false;
        }
        self.apply(RecordingPhase::Idle, now_ms);
        true
    }

    /// Apply a transition broadcast by another room member.
    ///
    /// Newest timestamp wins; an equal timestamp also wins, so on an exact
    /// tie the last received broadcast takes effect.
    pub fn apply_remote(&mut self, phase: RecordingPhase, timestamp_ms: i64) -> bool {
        if timestamp_ms < self.last_transition_ms {
            return false;
        }
        self.apply(phase, timestamp_ms);
        true
    }

    fn owns_phase_count_in(&self) -> bool {
        matches!(&self.phase, RecordingPhase::CountIn { recorder } if *recorder == self.user_id)
    }

    fn apply(&mut self, phase: RecordingPhase, timestamp_ms: i64) {
        self.phase = phase;
        self.last_transition_ms = timestamp_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_local_recording_lifecycle() {
        // テスト項目: idle → count_in → recording → saving → idle の
        //             ローカル遷移が順に成立する
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");

        // when (操作) / then (期待する結果):
        assert!(tracker.begin_count_in(1000));
        assert_eq!(
            tracker.phase().wire(),
            (SessionState::CountIn, Some("u1".to_string()))
        );
        assert!(tracker.is_recorder());

        assert!(tracker.finish_count_in(2000));
        assert_eq!(
            tracker.phase().wire(),
            (SessionState::Recording, Some("u1".to_string()))
        );

        assert!(tracker.request_stop(3000));
        assert_eq!(
            tracker.phase().wire(),
            (SessionState::Saving, Some("u1".to_string()))
        );

        assert!(tracker.finish_saving(4000));
        assert_eq!(tracker.phase(), &RecordingPhase::Idle);
        assert_eq!(tracker.last_transition_ms(), 4000);
    }

    #[test]
    fn test_begin_count_in_refused_unless_idle() {
        // テスト項目: idle 以外の状態からは録音を開始できない
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");
        tracker.apply_remote(
            RecordingPhase::Recording {
                recorder: "u2".to_string(),
            },
            1000,
        );

        // when (操作):
        let started = tracker.begin_count_in(2000);

        // then (期待する結果):
        assert!(!started);
        assert!(!tracker.is_recorder());
    }

    #[test]
    fn test_count_in_is_cancelled_by_a_newer_remote_transition() {
        // テスト項目: カウントイン中に他メンバーの遷移を受けると
        //             finish_count_in が成立しない
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");
        assert!(tracker.begin_count_in(1000));

        // when (操作):
        let accepted = tracker.apply_remote(
            RecordingPhase::CountIn {
                recorder: "u2".to_string(),
            },
            1500,
        );
        let finished = tracker.finish_count_in(2000);

        // then (期待する結果):
        assert!(accepted);
        assert!(!finished);
        assert_eq!(tracker.phase().recorder(), Some("u2"));
    }

    #[test]
    fn test_only_the_recorder_may_stop() {
        // テスト項目: recorder 以外は録音を停止できない
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");
        tracker.apply_remote(
            RecordingPhase::Recording {
                recorder: "u2".to_string(),
            },
            1000,
        );

        // when (操作):
        let stopped = tracker.request_stop(2000);

        // then (期待する結果):
        assert!(!stopped);
        assert_eq!(tracker.phase().recorder(), Some("u2"));
    }

    #[test]
    fn test_stale_remote_transition_is_rejected() {
        // テスト項目: 古いタイムスタンプのブロードキャストは無視される
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");
        tracker.apply_remote(
            RecordingPhase::Recording {
                recorder: "u2".to_string(),
            },
            2000,
        );

        // when (操作):
        let accepted = tracker.apply_remote(RecordingPhase::Idle, 1000);

        // then (期待する結果):
        assert!(!accepted);
        assert_eq!(tracker.phase().recorder(), Some("u2"));
    }

    #[test]
    fn test_equal_timestamp_lets_the_last_broadcast_win() {
        // テスト項目: タイムスタンプが同値なら後着のブロードキャストが勝つ
        // given (前提条件):
        let mut tracker = SessionTracker::new("u1");
        tracker.apply_remote(
            RecordingPhase::CountIn {
                recorder: "u2".to_string(),
            },
            2000,
        );

        // when (操作):
        let accepted = tracker.apply_remote(
            RecordingPhase::CountIn {
                recorder: "u3".to_string(),
            },
            2000,
        );

        // then (期待する結果):
        assert!(accepted);
        assert_eq!(tracker.phase().recorder(), Some("u3"));
    }

    #[test]
    fn test_from_wire_rejects_ownerless_active_states() {
        // テスト項目: recorder を欠く非 idle 状態はワイヤから構築できない
        // given (前提条件) / when (操作) / then (期待する結果):
        assert_eq!(
            RecordingPhase::from_wire(SessionState::Idle, None),
            Some(RecordingPhase::Idle)
        );
        assert_eq!(RecordingPhase::from_wire(SessionState::Recording, None), None);
        assert_eq!(RecordingPhase::from_wire(SessionState::CountIn, None), None);
        assert_eq!(RecordingPhase::from_wire(SessionState::Saving, None), None);
        assert_eq!(
            RecordingPhase::from_wire(SessionState::Saving, Some("u2".to_string())),
            Some(RecordingPhase::Saving {
                recorder: "u2".to_string()
            })
        );
    }
}
