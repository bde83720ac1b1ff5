use log::{debug, info, warn};
use notefall::config::{self, Config};
use notefall::core::clock::GameClock;
use notefall::core::player::{MediaPlayer, SimulatedPlayer};
use notefall::game::chart::{ChartFile, NoteSnapshot, NoteStore};
use notefall::game::note::Lane;
use notefall::game::playfield::game_duration_ms;
use notefall::game::speed::SpeedMap;
use notefall::game::sync::{PlaybackSynchronizer, SyncAction};
use notefall::game::timing::{GridSnapper, TempoMap};
use std::sync::Arc;

const FRAME_MS: f64 = 1000.0 / 60.0;
/// Simulated player runs slightly fast so the drift loop has work to do.
const PLAYER_DRIFT: f64 = 1.012;

/// Eight bars of alternating taps with a hold on every downbeat.
fn demo_chart(store: &mut NoteStore) {
    let beat = store.grid().beat_duration_at(0.0).unwrap_or(500.0);
    for i in 0..32u32 {
        let t = 2000.0 + i as f64 * beat;
        let lane = Lane::clamped((i % 4) as i32);
        if i % 4 == 0 {
            store.add_hold(lane, t, t + beat * 2.0);
        } else {
            store.add_note(lane, t);
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install logger immediately, then set runtime max level from config after loading it.
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .try_init();
    log::set_max_level(log::LevelFilter::Warn);

    let cfg = Config::load(config::CONFIG_PATH);
    log::set_max_level(cfg.log_level.as_level_filter());

    let mut args = std::env::args().skip(1);
    let chart_path = args.next();
    let start_time_ms = match args.next() {
        Some(s) => s.parse::<f64>().map_err(|e| format!("bad start time '{s}': {e}"))?,
        None => 0.0,
    };

    let mut store = NoteStore::with_history_size(cfg.grid_snapper(), cfg.history_size);
    store.set_hold_duration(cfg.hold_duration_ms);
    let mut speed = SpeedMap::default();
    match chart_path {
        Some(path) => {
            let json = std::fs::read_to_string(&path).map_err(|e| format!("failed to read '{path}': {e}"))?;
            let file = ChartFile::parse(&json)?;
            if let Some(bpm) = file.bpm.or(cfg.bpm) {
                let tempo = TempoMap::new(bpm, &file.bpm_changes);
                debug!("Chart tempo: {bpm} bpm base, {} segments.", tempo.segment_count());
                store.set_grid(GridSnapper::with_tempo(tempo, cfg.grid_division));
                speed = SpeedMap::new(bpm, &file.speed_changes);
            } else if !file.bpm_changes.is_empty() || !file.speed_changes.is_empty() {
                warn!("Chart has tempo or speed changes but no base bpm; ignoring them.");
            }
            let count = store.restore(&file.notes);
            info!("Loaded {count} notes from '{path}' ({} speed sections).", speed.len());
        }
        None => {
            demo_chart(&mut store);
            info!("No chart given, using a {}-note demo chart.", store.len());
        }
    }

    let mut sync = PlaybackSynchronizer::new(cfg.sync_config(start_time_ms));
    let notes: NoteSnapshot = Arc::from(sync.prepare_notes(&store.snapshot()));
    if notes.is_empty() {
        warn!("Nothing to play after {:.0}ms.", sync.config().start_time_ms);
    }
    let duration = game_duration_ms(&notes);
    let playfield = cfg.playfield().with_speed(speed.rebased(sync.lead(), sync.config().start_time_ms));
    info!(
        "Preview: {} notes, {:.1}s, lead {:.0}ms, start delay {:.0}ms",
        notes.len(),
        duration / 1000.0,
        sync.lead().ms(),
        cfg.start_delay_ms
    );

    let mut player = SimulatedPlayer::new(PLAYER_DRIFT);
    let mut clock = GameClock::new(cfg.start_delay_ms);
    sync.on_ready(&mut player);

    let mut wall_ms = 0.0;
    let mut log_timer = 0.0;
    let mut resyncs = 0u32;
    while clock.now_ms() < duration {
        wall_ms += FRAME_MS;
        let game_time = clock.advance(FRAME_MS);
        player.advance(FRAME_MS);
        sync.on_state_change(player.state());

        match sync.tick(&mut player, game_time, wall_ms) {
            SyncAction::Resynced { .. } => resyncs += 1,
            SyncAction::CoolingDown { drift_s } => debug!("Drift {drift_s:.3}s while cooling down"),
            _ => {}
        }

        let frame = playfield.frame(&notes, game_time);
        log_timer += FRAME_MS;
        if log_timer >= 1000.0 {
            log_timer -= 1000.0;
            info!(
                "t={:.2}s media={:.2}s drawn={} passed={}/{}",
                game_time / 1000.0,
                player.current_time(),
                frame.notes.len(),
                frame.passed,
                notes.len()
            );
        }
    }

    clock.stop();
    sync.stop(&mut player);
    info!("Preview finished with {resyncs} resyncs.");
    Ok(())
}
