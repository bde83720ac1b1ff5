use crate::game::chart::NoteSnapshot;
use crate::game::geometry::{self, Anchor, GAME_HEIGHT, HOLD_CAP_PX, JUDGE_LINE_Y, NoteGeometry};
use crate::game::note::{Lane, Note, NoteId};
use crate::game::speed::SpeedMap;

/// A note whose tail passed the judge line by more than this is gone.
pub const MISS_WINDOW_MS: f64 = 150.0;

const TAIL_MS: f64 = 5000.0;
const MIN_GAME_DURATION_MS: f64 = 60_000.0;
const MAX_GAME_DURATION_MS: f64 = 300_000.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RenderNote {
    pub id: NoteId,
    pub lane: Lane,
    pub top: f32,
    pub height: f32,
    pub corner_radius: f32,
    pub is_hold: bool,
    pub anchor: Anchor,
}

/// Everything drawn for one frame, derived from one snapshot at one game time.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub game_time_ms: f64,
    pub notes: Vec<RenderNote>,
    /// Notes already past the miss window at this game time.
    pub passed: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Playfield {
    /// Fall duration at the chart's base tempo.
    pub fall_duration_ms: f64,
    pub judge_line_y: f32,
    pub hold_cap_px: f32,
    /// Speed sections on the same clock as the notes being drawn.
    pub speed: SpeedMap,
}

impl Default for Playfield {
    fn default() -> Self {
        Self {
            fall_duration_ms: geometry::fall_duration_ms(1.0),
            judge_line_y: JUDGE_LINE_Y,
            hold_cap_px: HOLD_CAP_PX,
            speed: SpeedMap::default(),
        }
    }
}

impl Playfield {
    pub fn new(speed: f64, judge_line_y: f32, hold_cap_px: f32) -> Self {
        Self {
            fall_duration_ms: geometry::fall_duration_ms(speed),
            judge_line_y: if judge_line_y.is_finite() && judge_line_y > 0.0 { judge_line_y } else { JUDGE_LINE_Y },
            hold_cap_px: if hold_cap_px.is_finite() && hold_cap_px >= 0.0 { hold_cap_px } else { HOLD_CAP_PX },
            speed: SpeedMap::default(),
        }
    }

    pub fn with_speed(mut self, speed: SpeedMap) -> Self {
        self.speed = speed;
        self
    }

    #[inline(always)]
    fn y_at(&self, time_ms: f64, game_time_ms: f64) -> f32 {
        let fall = self.speed.fall_duration_ms(time_ms, self.fall_duration_ms);
        geometry::fall_y(time_ms, game_time_ms, fall, self.judge_line_y)
    }

    fn geometry(&self, note: &Note, game_time_ms: f64) -> NoteGeometry {
        let start_y = self.y_at(note.time, game_time_ms);
        let end_y = self.y_at(note.end_or_time(), game_time_ms);
        geometry::resolve(note.kind, start_y, end_y, self.hold_cap_px)
    }

    pub fn frame(&self, snapshot: &NoteSnapshot, game_time_ms: f64) -> Frame {
        let mut frame = Frame { game_time_ms, notes: Vec::with_capacity(snapshot.len()), passed: 0 };
        for note in snapshot.iter() {
            if note.hit || note.end_or_time() - game_time_ms < -MISS_WINDOW_MS {
                frame.passed += 1;
                continue;
            }
            let g = self.geometry(note, game_time_ms);
            if g.bottom() <= 0.0 || g.visual_top() >= GAME_HEIGHT {
                continue;
            }
            frame.notes.push(RenderNote {
                id: note.id,
                lane: note.lane,
                top: g.top,
                height: g.height,
                corner_radius: g.corner_radius,
                is_hold: note.is_hold(),
                anchor: g.anchor,
            });
        }
        frame
    }
}

/// Session length for a chart: five seconds past the last note end, kept
/// between one and five minutes.
pub fn game_duration_ms(notes: &[Note]) -> f64 {
    let last_end = notes.iter().map(Note::end_or_time).fold(0.0, f64::max);
    (last_end + TAIL_MS).clamp(MIN_GAME_DURATION_MS, MAX_GAME_DURATION_MS)
}
