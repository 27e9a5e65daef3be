//! Local take log.
//!
//! Keeps per-session metadata for captured takes (number, room, tempo,
//! timing) the way the band workspace lists them. The audio artifact
//! itself belongs to the capture pipeline, not to this process.

/// Metadata for one captured take.
#[derive(Debug, Clone, PartialEq)]
pub struct Take {
    pub number: usize,
    pub room_id: String,
    pub bpm: f64,
    pub started_at_ms: i64,
    /// `None` while the take is still being captured.
    pub duration_ms: Option<i64>,
}

/// Takes captured during this session, in order.
#[derive(Debug, Default)]
pub struct TakeLog {
    takes: Vec<Take>,
}

impl TakeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new take and return its 1-based number.
    pub fn start_take(&mut self, room_id: &str, bpm: f64, started_at_ms: i64) -> usize {
        let number = self.takes.len() + 1;
        self.takes.push(Take {
            number,
            room_id: room_id.to_string(),
            bpm,
            started_at_ms,
            duration_ms: None,
        });
        number
    }

    /// Close the most recent take, stamping its duration.
    pub fn finish_take(&mut self, ended_at_ms: i64) {
        if let Some(take) = self.takes.last_mut()
            && take.duration_ms.is_none()
        {
            take.duration_ms = Some((ended_at_ms - take.started_at_ms).max(0));
        }
    }

    pub fn takes(&self) -> &[Take] {
        &self.takes
    }
}
