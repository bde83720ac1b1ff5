use crate::core::player::{MediaPlayer, PlayerState};
use crate::game::note::{Note, NoteId, NoteType, sort_by_time};
use log::{debug, info};

pub const DEFAULT_LEAD_OFFSET_MS: f64 = 3000.0;
pub const DEFAULT_START_DELAY_MS: f64 = 4000.0;
pub const DEFAULT_RESYNC_THRESHOLD_S: f64 = 0.5;
pub const DEFAULT_RESYNC_COOLDOWN_MS: f64 = 2000.0;

/// Constant lead, in ms, between the note-fall clock and the media.
///
/// Note `time` is always the authored hit time. The media is cued `lead` ms
/// early and every note's fall time is pushed `lead` ms later, so the lead
/// buys reaction time before the first note while each note still reaches
/// the judge line on the media instant of its hit time. The seek, the
/// per-frame media position and the note fall time are all derived here and
/// nowhere else.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LeadOffset(f64);

impl Default for LeadOffset {
    fn default() -> Self {
        Self(DEFAULT_LEAD_OFFSET_MS)
    }
}

impl LeadOffset {
    /// Negative or non-finite leads are treated as zero.
    pub fn from_ms(ms: f64) -> Self {
        Self(if ms.is_finite() { ms.max(0.0) } else { 0.0 })
    }

    #[inline(always)]
    pub fn ms(self) -> f64 {
        self.0
    }

    /// Media position to cue before the session starts.
    #[inline(always)]
    pub fn seek_seconds(self, start_time_ms: f64) -> f64 {
        ((start_time_ms - self.0) / 1000.0).max(0.0)
    }

    /// Media position that matches `game_time_ms` on the fall clock.
    #[inline(always)]
    pub fn media_seconds(self, start_time_ms: f64, game_time_ms: f64) -> f64 {
        ((start_time_ms + game_time_ms - self.0) / 1000.0).max(0.0)
    }

    /// Fall-clock time at which a note authored at `note_time_ms` reaches the
    /// judge line, for a session starting at `start_ms`. Notes before the
    /// start are pulled up to it. Inverse of [`media_seconds`](Self::media_seconds).
    #[inline(always)]
    pub fn relative_start(self, note_time_ms: f64, start_ms: f64) -> f64 {
        note_time_ms.max(start_ms) - start_ms + self.0
    }

    /// Fall-clock time at which the media leaves its cue point. Later than
    /// zero only when the lead reaches back past the start of the media.
    #[inline(always)]
    pub fn play_at_ms(self, start_time_ms: f64) -> f64 {
        (self.0 - start_time_ms).max(0.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SyncConfig {
    pub lead: LeadOffset,
    /// Pre-roll before the media starts.
    pub start_delay_ms: f64,
    /// Chart time the session starts from.
    pub start_time_ms: f64,
    pub playback_rate: f64,
    pub resync_threshold_s: f64,
    pub resync_cooldown_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lead: LeadOffset::default(),
            start_delay_ms: DEFAULT_START_DELAY_MS,
            start_time_ms: 0.0,
            playback_rate: 1.0,
            resync_threshold_s: DEFAULT_RESYNC_THRESHOLD_S,
            resync_cooldown_ms: DEFAULT_RESYNC_COOLDOWN_MS,
        }
    }
}

impl SyncConfig {
    /// Session start is floored to whole ms and clamped to non-negative.
    pub fn with_start_time(mut self, start_time_ms: f64) -> Self {
        self.start_time_ms = if start_time_ms.is_finite() { start_time_ms.floor().max(0.0) } else { 0.0 };
        self
    }

    #[inline(always)]
    fn rate(&self) -> f64 {
        if self.playback_rate.is_finite() && self.playback_rate > 0.0 { self.playback_rate } else { 1.0 }
    }
}

/// Outcome of one drift-correction step, for logging and tests.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SyncAction {
    /// Player not ready, or playback stopped.
    Idle,
    /// Before the media should move: player paused and cued at `seconds`.
    Cued { seconds: f64 },
    /// First frame at or past the play point: player started at `seconds`.
    Started { seconds: f64 },
    InSync { drift_s: f64 },
    /// Drift over the threshold but a recent resync is still cooling down.
    CoolingDown { drift_s: f64 },
    Resynced { from_s: f64, to_s: f64 },
    /// Host reports the player buffering; no corrections until it resumes.
    Buffering,
}

pub struct PlaybackSynchronizer {
    config: SyncConfig,
    ready: bool,
    cued: bool,
    started: bool,
    stopped: bool,
    player_state: PlayerState,
    last_resync_ms: Option<f64>,
    last_reported_s: Option<f64>,
    stalled_frames: u32,
}

impl PlaybackSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ready: false,
            cued: false,
            started: false,
            stopped: false,
            player_state: PlayerState::Unstarted,
            last_resync_ms: None,
            last_reported_s: None,
            stalled_frames: 0,
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline(always)]
    pub fn lead(&self) -> LeadOffset {
        self.config.lead
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Consecutive frames the player has reported the same position.
    pub fn stalled_frames(&self) -> u32 {
        self.stalled_frames
    }

    #[inline(always)]
    pub fn seek_seconds(&self) -> f64 {
        self.config.lead.seek_seconds(self.config.start_time_ms)
    }

    #[inline(always)]
    pub fn desired_media_seconds(&self, game_time_ms: f64) -> f64 {
        self.config.lead.media_seconds(self.config.start_time_ms, game_time_ms)
    }

    /// Player-ready callback: apply the rate and cue the start position.
    pub fn on_ready<P: MediaPlayer + ?Sized>(&mut self, player: &mut P) {
        self.ready = true;
        let seconds = self.seek_seconds();
        player.set_playback_rate(self.config.rate());
        player.seek(seconds);
        info!(
            "Player ready: cued at {seconds:.3}s (start={:.0}ms, lead={:.0}ms, rate={:.2}x)",
            self.config.start_time_ms,
            self.config.lead.ms(),
            self.config.rate()
        );
    }

    pub fn on_state_change(&mut self, state: PlayerState) {
        if state != self.player_state {
            debug!("Player state {:?} -> {:?}", self.player_state, state);
        }
        self.player_state = state;
    }

    pub fn set_playback_rate<P: MediaPlayer + ?Sized>(&mut self, player: &mut P, rate: f64) {
        self.config.playback_rate = rate;
        if self.ready {
            player.set_playback_rate(self.config.rate());
        }
    }

    /// One drift-correction step for the frame whose game clock reads
    /// `game_time_ms`. `now_ms` is a monotonic wall clock used for the resync
    /// cooldown.
    pub fn tick<P: MediaPlayer + ?Sized>(&mut self, player: &mut P, game_time_ms: f64, now_ms: f64) -> SyncAction {
        if !self.ready || self.stopped {
            return SyncAction::Idle;
        }

        if game_time_ms < self.config.lead.play_at_ms(self.config.start_time_ms) {
            if self.cued && !self.started {
                return SyncAction::Idle;
            }
            let seconds = self.seek_seconds();
            player.pause();
            player.seek(seconds);
            self.cued = true;
            self.started = false;
            debug!("Pre-roll: cued at {seconds:.3}s");
            return SyncAction::Cued { seconds };
        }

        if !self.started {
            let seconds = self.desired_media_seconds(game_time_ms);
            player.set_playback_rate(self.config.rate());
            player.seek(seconds);
            player.play();
            self.started = true;
            self.last_resync_ms = Some(now_ms);
            self.last_reported_s = None;
            self.stalled_frames = 0;
            info!("Playback started at {seconds:.3}s");
            return SyncAction::Started { seconds };
        }

        let current = player.current_time();
        if self.last_reported_s == Some(current) {
            self.stalled_frames = self.stalled_frames.saturating_add(1);
        } else {
            self.stalled_frames = 0;
        }
        self.last_reported_s = Some(current);

        if self.player_state == PlayerState::Buffering {
            return SyncAction::Buffering;
        }

        let desired = self.desired_media_seconds(game_time_ms);
        let drift_s = current - desired;
        if drift_s.abs() <= self.config.resync_threshold_s {
            return SyncAction::InSync { drift_s };
        }

        let cooled = self
            .last_resync_ms
            .is_none_or(|last| now_ms - last > self.config.resync_cooldown_ms);
        if !cooled {
            return SyncAction::CoolingDown { drift_s };
        }

        player.seek(desired);
        self.last_resync_ms = Some(now_ms);
        self.last_reported_s = None;
        info!(
            "Resync: {current:.2}s -> {desired:.2}s (drift {:.2}s, stalled frames {})",
            drift_s.abs(),
            self.stalled_frames
        );
        SyncAction::Resynced { from_s: current, to_s: desired }
    }

    /// Halts drift correction. Later ticks are no-ops until [`restart`](Self::restart).
    pub fn stop<P: MediaPlayer + ?Sized>(&mut self, player: &mut P) {
        if self.ready {
            player.pause();
        }
        self.stopped = true;
        self.started = false;
        info!("Playback stopped.");
    }

    /// Re-arms a stopped session (retest) without waiting for another ready.
    pub fn restart(&mut self) {
        self.stopped = false;
        self.cued = false;
        self.started = false;
        self.last_resync_ms = None;
        self.last_reported_s = None;
        self.stalled_frames = 0;
    }

    /// Rebases a chart onto this session's start for preview playback: notes
    /// ending before the start are dropped, holds straddling it are trimmed,
    /// times become relative fall-clock times, ids are renumbered from 1.
    pub fn prepare_notes(&self, notes: &[Note]) -> Vec<Note> {
        let start = self.config.start_time_ms;
        let lead = self.config.lead;
        let mut prepared: Vec<Note> = notes
            .iter()
            .filter(|n| n.end_or_time() >= start)
            .map(|n| {
                let adjusted = n.time.max(start);
                let trimmed = (n.end_or_time() - adjusted).max(0.0);
                let time = lead.relative_start(n.time, start);
                let mut note = n.clone();
                note.time = time;
                if trimmed > 0.0 {
                    note.kind = NoteType::Hold;
                    note.end_time = Some(time + trimmed);
                } else {
                    note.kind = NoteType::Tap;
                    note.end_time = None;
                }
                note.y = 0.0;
                note.hit = false;
                note
            })
            .collect();
        sort_by_time(&mut prepared);
        for (i, note) in prepared.iter_mut().enumerate() {
            note.id = NoteId(i as u32 + 1);
        }
        prepared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::player::SimulatedPlayer;
    use crate::game::note::Lane;

    fn config(start_ms: f64) -> SyncConfig {
        SyncConfig { lead: LeadOffset::from_ms(3000.0), ..SyncConfig::default() }.with_start_time(start_ms)
    }

    #[test]
    fn initial_seek_is_pulled_back_by_the_lead() {
        assert_eq!(LeadOffset::from_ms(3000.0).seek_seconds(10_000.0), 7.0);
        assert_eq!(LeadOffset::from_ms(3000.0).seek_seconds(1_000.0), 0.0);
    }

    #[test]
    fn desired_media_position_tracks_game_time() {
        let lead = LeadOffset::from_ms(3000.0);
        assert_eq!(lead.media_seconds(0.0, 5000.0), 2.0);
        assert_eq!(lead.media_seconds(0.0, 1000.0), 0.0);
    }

    #[test]
    fn note_reaches_the_judge_line_on_its_hit_time() {
        let lead = LeadOffset::from_ms(3000.0);
        let rel = lead.relative_start(12_500.0, 10_000.0);
        assert_eq!(rel, 5500.0);
        assert_eq!(lead.media_seconds(10_000.0, rel), 12.5);
        assert_eq!(lead.relative_start(9000.0, 10_000.0), 3000.0, "early notes are pulled up to the start");
    }

    #[test]
    fn media_waits_when_the_lead_reaches_before_zero() {
        let lead = LeadOffset::from_ms(3000.0);
        assert_eq!(lead.play_at_ms(10_000.0), 0.0);
        assert_eq!(lead.play_at_ms(1000.0), 2000.0);
        assert_eq!(lead.media_seconds(1000.0, lead.play_at_ms(1000.0)), lead.seek_seconds(1000.0));
    }

    #[test]
    fn lead_rejects_nonsense() {
        assert_eq!(LeadOffset::from_ms(-50.0).ms(), 0.0);
        assert_eq!(LeadOffset::from_ms(f64::NAN).ms(), 0.0);
    }

    #[test]
    fn nothing_reaches_the_player_before_ready() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        assert_eq!(sync.tick(&mut player, -100.0, 0.0), SyncAction::Idle);
        assert_eq!(sync.tick(&mut player, 500.0, 16.0), SyncAction::Idle);
        assert!(player.seeks().is_empty());
        assert!(!player.is_playing());
    }

    #[test]
    fn ready_cues_rate_and_seek() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(SyncConfig { playback_rate: 1.5, ..config(10_000.0) });
        sync.on_ready(&mut player);
        assert_eq!(player.seeks(), &[7.0]);
        assert_eq!(player.rate(), 1.5);
    }

    #[test]
    fn pre_roll_cues_once_then_starts_from_the_cue() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        sync.on_ready(&mut player);
        assert_eq!(sync.tick(&mut player, -4000.0, 0.0), SyncAction::Cued { seconds: 7.0 });
        assert_eq!(sync.tick(&mut player, -3984.0, 16.0), SyncAction::Idle);
        assert!(!player.is_playing());
        assert_eq!(sync.tick(&mut player, 0.0, 4000.0), SyncAction::Started { seconds: 7.0 });
        assert!(player.is_playing());
    }

    #[test]
    fn small_drift_is_left_alone() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        sync.on_ready(&mut player);
        sync.tick(&mut player, 0.0, 0.0);
        player.advance(1000.0);
        match sync.tick(&mut player, 1100.0, 3000.0) {
            SyncAction::InSync { drift_s } => assert!((drift_s + 0.1).abs() < 1e-9, "drift={drift_s}"),
            other => panic!("expected InSync, got {other:?}"),
        }
    }

    #[test]
    fn large_drift_resyncs_after_cooldown() {
        let mut player = SimulatedPlayer::new(1.5);
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        sync.on_ready(&mut player);
        sync.tick(&mut player, 0.0, 0.0);

        player.advance(1000.0); // player 1.5 s ahead of 7.0 -> 8.5, desired 8.0
        assert!(matches!(sync.tick(&mut player, 1000.0, 1000.0), SyncAction::InSync { .. }));

        player.advance(1000.0); // 10.0 vs 9.0, but the start counts as a resync
        assert!(matches!(sync.tick(&mut player, 2000.0, 2000.0), SyncAction::CoolingDown { .. }));

        player.advance(1000.0); // 11.5 vs 10.0
        assert_eq!(
            sync.tick(&mut player, 3000.0, 3000.0),
            SyncAction::Resynced { from_s: 11.5, to_s: 10.0 }
        );
        assert_eq!(player.current_time(), 10.0);
    }

    #[test]
    fn stalled_player_is_tolerated_then_corrected() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(3000.0));
        sync.on_ready(&mut player);
        sync.tick(&mut player, 0.0, 0.0);
        player.set_stalled(true);

        let mut now = 0.0;
        let mut game = 0.0;
        let mut resynced = false;
        for _ in 0..300 {
            now += 16.0;
            game += 16.0;
            player.advance(16.0);
            if let SyncAction::Resynced { to_s, .. } = sync.tick(&mut player, game, now) {
                assert!((to_s - game / 1000.0).abs() < 1e-9);
                resynced = true;
                break;
            }
        }
        assert!(resynced, "a stalled player must eventually be pulled back into sync");
    }

    #[test]
    fn player_holds_at_zero_until_the_media_catches_up() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(1000.0));
        sync.on_ready(&mut player);
        assert_eq!(sync.tick(&mut player, -10.0, 0.0), SyncAction::Cued { seconds: 0.0 });
        assert_eq!(sync.tick(&mut player, 1000.0, 1010.0), SyncAction::Idle);
        assert!(!player.is_playing(), "media would sit before its own start");
        assert_eq!(sync.tick(&mut player, 2016.0, 2026.0), SyncAction::Started { seconds: 0.016 });
        assert!(player.is_playing());
    }

    #[test]
    fn buffering_player_is_not_seeked() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        sync.on_ready(&mut player);
        sync.tick(&mut player, 0.0, 0.0);
        sync.on_state_change(PlayerState::Buffering);
        let seeks = player.seeks().len();
        assert_eq!(sync.tick(&mut player, 60_000.0, 60_000.0), SyncAction::Buffering);
        assert_eq!(player.seeks().len(), seeks);
    }

    #[test]
    fn stop_halts_the_loop_and_restart_rearms_it() {
        let mut player = SimulatedPlayer::default();
        let mut sync = PlaybackSynchronizer::new(config(10_000.0));
        sync.on_ready(&mut player);
        sync.tick(&mut player, 0.0, 0.0);
        sync.stop(&mut player);
        assert!(sync.is_stopped());
        assert!(!player.is_playing());
        assert_eq!(sync.tick(&mut player, 100.0, 100.0), SyncAction::Idle);
        sync.restart();
        assert!(!sync.is_stopped());
        assert!(matches!(sync.tick(&mut player, 0.0, 200.0), SyncAction::Started { .. }));
    }

    #[test]
    fn prepare_trims_rebases_and_renumbers() {
        let lane = Lane::new(0).unwrap();
        let notes = vec![
            Note::tap(NoteId(10), lane, 500.0),
            Note::hold(NoteId(11), lane, 800.0, 1500.0),
            Note::tap(NoteId(12), lane, 2000.0),
            Note::hold(NoteId(13), lane, 1000.0, 1000.0),
        ];
        let sync = PlaybackSynchronizer::new(config(1000.0));
        let prepared = sync.prepare_notes(&notes);
        assert_eq!(prepared.len(), 3, "the tap at 500 ends before the start");
        assert_eq!(prepared[0].time, 3000.0, "start plus the lead");
        assert_eq!(prepared[0].end_time, Some(3500.0), "straddling hold is trimmed");
        assert_eq!(prepared[1].kind, NoteType::Tap, "zero-length hold becomes a tap");
        assert_eq!(prepared[2].time, 4000.0);
        let ids: Vec<u32> = prepared.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
