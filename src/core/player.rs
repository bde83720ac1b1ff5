/* ============================== Public API ============================== */

/// What the host reports through the player's state-change callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

/// External media player driven by the synchronizer. Requests are
/// fire-and-forget: the player applies them whenever it gets to them and the
/// caller never waits.
pub trait MediaPlayer {
    /// Reported playback position in seconds. May lag or repeat while the
    /// player stalls.
    fn current_time(&self) -> f64;

    fn seek(&mut self, seconds: f64);

    fn set_playback_rate(&mut self, rate: f64);

    fn play(&mut self);

    fn pause(&mut self);
}

/* ========================= Simulated media player ========================= */

/// Deterministic in-process player. Its clock advances only when the host
/// calls [`advance`](Self::advance), scaled by the playback rate and a drift
/// factor so tests can make it run fast, slow, or stall.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    position_s: f64,
    rate: f64,
    drift: f64,
    playing: bool,
    stalled: bool,
    seeks: Vec<f64>,
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SimulatedPlayer {
    /// `drift` of 1.0 keeps perfect time; 1.01 runs 1% fast.
    pub fn new(drift: f64) -> Self {
        Self {
            position_s: 0.0,
            rate: 1.0,
            drift: if drift.is_finite() && drift > 0.0 { drift } else { 1.0 },
            playing: false,
            stalled: false,
            seeks: Vec::new(),
        }
    }

    pub fn advance(&mut self, dt_ms: f64) {
        if !self.playing || self.stalled || !dt_ms.is_finite() || dt_ms <= 0.0 {
            return;
        }
        self.position_s += dt_ms / 1000.0 * self.rate * self.drift;
    }

    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Every seek target received, oldest first.
    pub fn seeks(&self) -> &[f64] {
        &self.seeks
    }

    pub fn state(&self) -> PlayerState {
        match (self.playing, self.stalled) {
            (true, true) => PlayerState::Buffering,
            (true, false) => PlayerState::Playing,
            (false, _) if self.seeks.is_empty() => PlayerState::Unstarted,
            (false, _) => PlayerState::Paused,
        }
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        self.position_s
    }

    fn seek(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        self.seeks.push(seconds);
        self.position_s = seconds;
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}
