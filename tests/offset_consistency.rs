use notefall::core::clock::GameClock;
use notefall::core::player::{MediaPlayer, SimulatedPlayer};
use notefall::game::chart::NoteStore;
use notefall::game::geometry::{JUDGE_LINE_Y, fall_duration_ms, fall_y};
use notefall::game::note::Lane;
use notefall::game::sync::{LeadOffset, PlaybackSynchronizer, SyncConfig};

const FRAME_MS: f64 = 10.0;

#[test]
fn note_time_on_the_fall_clock_maps_back_to_its_hit_time() {
    for lead_ms in [0.0, 1500.0, 3000.0] {
        let lead = LeadOffset::from_ms(lead_ms);
        for start in [0.0, 1000.0, 2500.0, 3000.0, 10_000.0] {
            assert_eq!(
                lead.media_seconds(start, lead.play_at_ms(start)),
                lead.seek_seconds(start),
                "lead={lead_ms} start={start}: media leaves the cue point where it was cued"
            );
            for note_time in [start - 700.0, start, start + 1234.0, start + 60_000.0] {
                let rel = lead.relative_start(note_time, start);
                let media = lead.media_seconds(start, rel);
                let expected = note_time.max(start) / 1000.0;
                assert!(
                    (media - expected).abs() < 1e-9,
                    "lead={lead_ms} start={start} note={note_time}: {media} vs {expected}"
                );
            }
        }
    }
}

/// Runs a preview session in 10 ms frames until the fall clock reaches the
/// prepared note. Returns the note's fall-clock time, the clock reading and
/// the player.
fn play_until_hit(start_ms: f64, lead_ms: f64, note_ms: f64) -> (f64, f64, SimulatedPlayer) {
    let mut store = NoteStore::default();
    store.add_note(Lane::new(2).unwrap(), note_ms).unwrap();

    let config = SyncConfig { lead: LeadOffset::from_ms(lead_ms), ..SyncConfig::default() }.with_start_time(start_ms);
    let mut sync = PlaybackSynchronizer::new(config);
    let notes = sync.prepare_notes(&store.snapshot());
    assert_eq!(notes.len(), 1);
    let hit_at = notes[0].time;

    let mut player = SimulatedPlayer::default();
    let mut clock = GameClock::new(100.0);
    sync.on_ready(&mut player);

    let mut wall = 0.0;
    while clock.now_ms() < hit_at {
        wall += FRAME_MS;
        let t = clock.advance(FRAME_MS);
        player.advance(FRAME_MS);
        sync.on_state_change(player.state());
        sync.tick(&mut player, t, wall);
    }
    (hit_at, clock.now_ms(), player)
}

#[test]
fn note_sits_on_the_judge_line_when_the_player_reports_its_hit_time() {
    let cases = [
        (10_000.0, 3000.0, 12_500.0),
        (0.0, 3000.0, 1500.0),
        (2000.0, 3000.0, 2400.0),
        (5000.0, 0.0, 7000.0),
        (1000.0, 1500.0, 1000.0),
    ];
    for (start, lead, note) in cases {
        let (hit_at, now, player) = play_until_hit(start, lead, note);
        assert_eq!(now, hit_at, "frames land on the note");
        assert_eq!(fall_y(hit_at, now, fall_duration_ms(1.0), JUDGE_LINE_Y), JUDGE_LINE_Y);
        let media_ms = player.current_time() * 1000.0;
        assert!(
            (media_ms - note).abs() < 1e-3,
            "start={start} lead={lead}: media {media_ms}ms at the hit of a note due {note}ms"
        );
        if lead > start {
            assert!(
                player.seeks().iter().take(3).all(|s| *s == 0.0),
                "start={start} lead={lead}: seek clamps to the head of the media, got {:?}",
                player.seeks()
            );
        }
    }
}
