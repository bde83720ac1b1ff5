/// Frame-driven game clock in milliseconds. Starts at `-start_delay_ms` so the
/// first notes have a pre-roll to fall in; advanced once per frame by the
/// host's frame delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameClock {
    now_ms: f64,
    running: bool,
}

impl GameClock {
    pub fn new(start_delay_ms: f64) -> Self {
        let delay = if start_delay_ms.is_finite() { start_delay_ms.max(0.0) } else { 0.0 };
        Self { now_ms: -delay, running: true }
    }

    /// Negative, non-finite, or post-stop deltas are ignored.
    pub fn advance(&mut self, dt_ms: f64) -> f64 {
        if self.running && dt_ms.is_finite() && dt_ms > 0.0 {
            self.now_ms += dt_ms;
        }
        self.now_ms
    }

    #[inline(always)]
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    #[inline(always)]
    pub fn in_pre_roll(&self) -> bool {
        self.now_ms < 0.0
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_pre_roll_and_counts_up() {
        let mut clock = GameClock::new(4000.0);
        assert_eq!(clock.now_ms(), -4000.0);
        assert!(clock.in_pre_roll());
        for _ in 0..250 {
            clock.advance(16.0);
        }
        assert_eq!(clock.now_ms(), 0.0);
        assert!(!clock.in_pre_roll());
    }

    #[test]
    fn ignores_bad_deltas_and_freezes_when_stopped() {
        let mut clock = GameClock::new(0.0);
        clock.advance(-5.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.now_ms(), 0.0);
        clock.advance(10.0);
        clock.stop();
        clock.advance(10.0);
        assert_eq!(clock.now_ms(), 10.0);
        assert!(!clock.is_running());
    }
}
