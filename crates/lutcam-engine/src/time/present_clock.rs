use std::time::{Duration, Instant};

/// Timing of one presented frame.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous presented frame, clamped.
    pub dt: f32,
    pub now: Instant,
    /// Zero-based index of the frame since the clock was created.
    pub frame_index: u64,
}

/// Measures the cadence of buffer swaps on a render thread.
///
/// The render thread ticks this once per successful swap. Pausing stalls the
/// thread for arbitrarily long, so the thread calls [`PresentClock::reset`]
/// when it resumes; otherwise the first frame after a resume would report the
/// whole pause as its delta.
#[derive(Debug, Clone)]
pub struct PresentClock {
    last: Option<Instant>,
    frame_index: u64,
    max_dt: Duration,
    smoothed_dt: f32,
}

impl PresentClock {
    const SMOOTHING: f32 = 0.1;

    pub fn new() -> Self {
        Self::with_max_dt(Duration::from_millis(500))
    }

    pub fn with_max_dt(max_dt: Duration) -> Self {
        Self {
            last: None,
            frame_index: 0,
            max_dt,
            smoothed_dt: 0.0,
        }
    }

    /// Forgets the previous timestamp; the next tick reports `dt == 0`.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last).min(self.max_dt),
            None => Duration::ZERO,
        };
        self.last = Some(now);

        let dt = dt.as_secs_f32();
        if dt > 0.0 {
            self.smoothed_dt = if self.smoothed_dt == 0.0 {
                dt
            } else {
                self.smoothed_dt + (dt - self.smoothed_dt) * Self::SMOOTHING
            };
        }

        let frame = FrameTime {
            dt,
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        frame
    }

    /// Exponentially smoothed presentation rate, `0.0` before two frames.
    pub fn frames_per_second(&self) -> f32 {
        if self.smoothed_dt > 0.0 {
            1.0 / self.smoothed_dt
        } else {
            0.0
        }
    }
}

impl Default for PresentClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_after_reset_has_zero_delta() {
        let mut clock = PresentClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        let f = clock.tick_at(t0 + Duration::from_millis(20));
        assert!((f.dt - 0.020).abs() < 1e-4);

        clock.reset();
        let f = clock.tick_at(t0 + Duration::from_secs(30));
        assert_eq!(f.dt, 0.0);
        assert_eq!(f.frame_index, 2);
    }

    #[test]
    fn long_stalls_are_clamped() {
        let mut clock = PresentClock::with_max_dt(Duration::from_millis(100));
        let t0 = Instant::now();
        clock.tick_at(t0);
        let f = clock.tick_at(t0 + Duration::from_secs(5));
        assert!((f.dt - 0.1).abs() < 1e-6);
    }

    #[test]
    fn rate_tracks_steady_cadence() {
        let mut clock = PresentClock::new();
        let t0 = Instant::now();
        for i in 0..60 {
            clock.tick_at(t0 + Duration::from_millis(i * 25));
        }
        assert!((clock.frames_per_second() - 40.0).abs() < 0.5);
    }
}
