use std::collections::VecDeque;
use std::time::{Duration, Instant};

const FRAME_HISTORY_SIZE: usize = 120;  // 2 seconds at 60fps
const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub average_frame_time_ms: f32,
    pub fps: f32,
    pub max_frame_time_ms: f32,
    pub min_frame_time_ms: f32,
    pub slow_frames: u32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            average_frame_time_ms: 0.0,
            fps: 0.0,
            max_frame_time_ms: 0.0,
            min_frame_time_ms: 0.0,
            slow_frames: 0,
        }
    }
}

/// Measures frame-to-frame intervals and periodically logs a summary.
pub struct FrameTimer {
    frame_history: VecDeque<Duration>,
    last_frame: Option<Instant>,
    last_stats_update: Instant,
    last_stats: FrameStats,
    target_frame_time: Duration,
    frame_counter: u64,
}

impl FrameTimer {
    pub fn new(target_fps: u32) -> Self {
        Self {
            frame_history: VecDeque::with_capacity(FRAME_HISTORY_SIZE),
            last_frame: None,
            last_stats_update: Instant::now(),
            last_stats: FrameStats::default(),
            target_frame_time: Duration::from_nanos(1_000_000_000 / target_fps.max(1) as u64),
            frame_counter: 0,
        }
    }

    /// Marks the end of a frame; returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Duration {
        let frame_time = self
            .last_frame
            .replace(now)
            .map(|previous| now.saturating_duration_since(previous))
            .unwrap_or_default();

        if self.frame_counter > 0 {
            self.record(frame_time);
        }
        self.frame_counter += 1;

        if now.saturating_duration_since(self.last_stats_update) >= STATS_INTERVAL {
            self.update_stats();
            self.last_stats_update = now;
            log::debug!(
                "{:.1} fps, frame time avg {:.2} ms (min {:.2}, max {:.2}), {} slow",
                self.last_stats.fps,
                self.last_stats.average_frame_time_ms,
                self.last_stats.min_frame_time_ms,
                self.last_stats.max_frame_time_ms,
                self.last_stats.slow_frames,
            );
        }

        frame_time
    }

    fn record(&mut self, frame_time: Duration) {
        if self.frame_history.len() >= FRAME_HISTORY_SIZE {
            self.frame_history.pop_front();
        }
        self.frame_history.push_back(frame_time);
    }

    pub fn stats(&self) -> &FrameStats {
        &self.last_stats
    }

    fn update_stats(&mut self) {
        if self.frame_history.is_empty() {
            return;
        }

        let total: Duration = self.frame_history.iter().sum();
        let max = self.frame_history.iter().max().copied().unwrap_or_default();
        let min = self.frame_history.iter().min().copied().unwrap_or_default();
        let slow = self
            .frame_history
            .iter()
            .filter(|&&t| t > self.target_frame_time)
            .count();

        let average = total / self.frame_history.len() as u32;
        let average_secs = average.as_secs_f32();

        self.last_stats = FrameStats {
            average_frame_time_ms: average_secs * 1000.0,
            fps: if average_secs > 0.0 { 1.0 / average_secs } else { 0.0 },
            max_frame_time_ms: max.as_secs_f32() * 1000.0,
            min_frame_time_ms: min.as_secs_f32() * 1000.0,
            slow_frames: slow as u32,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_tick_has_no_interval() {
        let mut timer = FrameTimer::new(60);
        assert_eq!(timer.tick(), Duration::ZERO);
        assert_eq!(timer.frame_counter, 1);
    }

    #[test]
    fn test_frame_timing_stats() {
        let mut timer = FrameTimer::new(100); // 10 ms budget
        let start = Instant::now();

        // Frame intervals of 5, 10, 15, 10 ms.
        let mut t = start;
        timer.tick_at(t);
        for ms in [5, 10, 15, 10] {
            t += Duration::from_millis(ms);
            let dt = timer.tick_at(t);
            assert_eq!(dt, Duration::from_millis(ms));
        }

        timer.update_stats();
        let stats = timer.stats();
        assert_relative_eq!(stats.average_frame_time_ms, 10.0, epsilon = 0.01);
        assert_relative_eq!(stats.fps, 100.0, epsilon = 0.1);
        assert_relative_eq!(stats.max_frame_time_ms, 15.0, epsilon = 0.01);
        assert_relative_eq!(stats.min_frame_time_ms, 5.0, epsilon = 0.01);
        assert_eq!(stats.slow_frames, 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut timer = FrameTimer::new(60);
        let mut t = Instant::now();
        for _ in 0..(FRAME_HISTORY_SIZE * 2) {
            t += Duration::from_millis(16);
            timer.tick_at(t);
        }
        assert_eq!(timer.frame_history.len(), FRAME_HISTORY_SIZE);
    }

    #[test]
    fn test_stats_refresh_once_per_interval() {
        let mut timer = FrameTimer::new(60);
        let mut t = timer.last_stats_update;
        timer.tick_at(t);
        t += Duration::from_millis(20);
        timer.tick_at(t);
        assert_eq!(timer.stats().fps, 0.0);

        t += STATS_INTERVAL;
        timer.tick_at(t);
        assert!(timer.stats().fps > 0.0);
    }
}
