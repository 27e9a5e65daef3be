//! Bounded latency sample window.
//!
//! The probe itself is a plain server echo. The client computes the round
//! trip, halves it for a one-way estimate (assuming symmetric up/down
//! latency, an approximation) and keeps the most recent samples for
//! display.

use std::collections::VecDeque;

/// Number of most-recent samples retained.
pub const WINDOW_SIZE: usize = 50;

/// Aggregates over the current window.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Mean absolute deviation from the average.
    pub jitter_ms: f64,
    pub samples: usize,
}

/// Sliding window of one-way latency estimates.
#[derive(Debug, Default)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
}

impl LatencyWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one round-trip measurement in milliseconds.
    pub fn record_round_trip(&mut self, rtt_ms: f64) {
        self.samples.push_back(rtt_ms / 2.0);
        if self.samples.len() > WINDOW_SIZE {
            self.samples.pop_front();
        }
    }

    /// Drop all samples, e.g. when (re)joining a room.
    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// The most recent one-way estimate.
    pub fn latest_ms(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// `None` until at least one sample arrived.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.samples.is_empty() {
            return None;
        }

        let count = self.samples.len() as f64;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &v in &self.samples {
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let average = sum / count;
        let deviation: f64 = self.samples.iter().map(|v| (v - average).abs()).sum();

        Some(LatencyStats {
            average_ms: average,
            min_ms: min,
            max_ms: max,
            jitter_ms: deviation / count,
            samples: self.samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_are_empty_before_any_sample() {
        // テスト項目: サンプルがないうちは統計が得られない
        // given (前提条件):
        let window = LatencyWindow::new();

        // when (操作) / then (期待する結果):
        assert_eq!(window.stats(), None);
        assert_eq!(window.latest_ms(), None);
    }

    #[test]
    fn test_round_trip_is_halved_into_a_one_way_estimate() {
        // テスト項目: 往復時間は半分にされて片道推定値になる
        // given (前提条件):
        let mut window = LatencyWindow::new();

        // when (操作):
        window.record_round_trip(80.0);

        // then (期待する結果):
        assert_eq!(window.latest_ms(), Some(40.0));
    }

    #[test]
    fn test_window_keeps_only_the_most_recent_samples() {
        // テスト項目: ウィンドウは直近 50 サンプルだけを保持する
        // given (前提条件):
        let mut window = LatencyWindow::new();

        // when (操作):
        // One large early sample followed by WINDOW_SIZE small ones.
        window.record_round_trip(1000.0);
        for _ in 0..WINDOW_SIZE {
            window.record_round_trip(20.0);
        }

        // then (期待する結果):
        let stats = window.stats().unwrap();
        assert_eq!(stats.samples, WINDOW_SIZE);
        assert_eq!(stats.max_ms, 10.0); // the 500 ms estimate fell out
    }

    #[test]
    fn test_average_min_max_and_jitter() {
        // テスト項目: 平均・最小・最大・ジッタ (平均絶対偏差) が正しい
        // given (前提条件):
        let mut window = LatencyWindow::new();
        window.record_round_trip(20.0); // 10 ms one-way
        window.record_round_trip(40.0); // 20 ms one-way

        // when (操作):
        let stats = window.stats().unwrap();

        // then (期待する結果):
        assert_eq!(stats.average_ms, 15.0);
        assert_eq!(stats.min_ms, 10.0);
        assert_eq!(stats.max_ms, 20.0);
        assert_eq!(stats.jitter_ms, 5.0);
        assert_eq!(stats.samples, 2);
    }

    #[test]
    fn test_reset_clears_the_window() {
        // テスト項目: reset で全サンプルが破棄される
        // given (前提条件):
        let mut window = LatencyWindow::new();
        window.record_round_trip(30.0);

        // when (操作):
        window.reset();

        // then (期待する結果):
        assert_eq!(window.stats(), None);
    }
}
