use crate::game::note::NoteType;

// --- Playfield metrics (px) ---
pub const GAME_HEIGHT: f32 = 800.0;
pub const JUDGE_LINE_Y: f32 = 640.0;
/// Where notes wait before they enter the field.
pub const OFFSCREEN_Y: f32 = -100.0;
pub const BASE_FALL_DURATION_MS: f64 = 2000.0;

// --- Note shapes (px) ---
pub const HOLD_CAP_PX: f32 = 24.0;
pub const MIN_HOLD_BODY_PX: f32 = 30.0;
pub const TAP_HEIGHT_PX: f32 = 60.0;
pub const HOLD_CORNER_RADIUS_PX: f32 = 14.0;
pub const TAP_CORNER_RADIUS_PX: f32 = 8.0;

// --- Editor timeline ---
pub const PIXELS_PER_SECOND: f32 = 200.0;
pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;

/// How the presentation layer centers a note rectangle on its lane.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Centered on both axes around (lane_x, top).
    Center,
    /// Centered horizontally only; `top` is the real top edge.
    CenterX,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteGeometry {
    pub top: f32,
    pub height: f32,
    pub corner_radius: f32,
    pub anchor: Anchor,
}

impl NoteGeometry {
    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        match self.anchor {
            Anchor::Center => self.top + self.height * 0.5,
            Anchor::CenterX => self.top + self.height,
        }
    }

    #[inline(always)]
    pub fn visual_top(&self) -> f32 {
        match self.anchor {
            Anchor::Center => self.top - self.height * 0.5,
            Anchor::CenterX => self.top,
        }
    }
}

/// Rectangle for a note whose head sits at `start_y` and, for holds, whose
/// tail sits at `end_y`. Holds get a minimum body plus `cap` of overrun split
/// across both ends; taps are a fixed block centered on `start_y`.
pub fn resolve(kind: NoteType, start_y: f32, end_y: f32, cap: f32) -> NoteGeometry {
    match kind {
        NoteType::Hold => NoteGeometry {
            top: start_y.min(end_y) - cap * 0.5,
            height: (end_y - start_y).abs().max(MIN_HOLD_BODY_PX) + cap,
            corner_radius: HOLD_CORNER_RADIUS_PX,
            anchor: Anchor::CenterX,
        },
        NoteType::Tap => NoteGeometry {
            top: start_y,
            height: TAP_HEIGHT_PX,
            corner_radius: TAP_CORNER_RADIUS_PX,
            anchor: Anchor::Center,
        },
    }
}

/// Fall duration at a scroll speed multiplier. Unusable speeds count as 1x.
#[inline(always)]
pub fn fall_duration_ms(speed: f64) -> f64 {
    let speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
    BASE_FALL_DURATION_MS / speed
}

/// Vertical position of something due at `time_ms` when the game clock reads
/// `game_time_ms`: 0 at the top of the field, `judge_line_y` on the hit
/// instant, clamped to the field.
pub fn fall_y(time_ms: f64, game_time_ms: f64, fall_duration: f64, judge_line_y: f32) -> f32 {
    let until_hit = time_ms - game_time_ms;
    if until_hit > fall_duration {
        return OFFSCREEN_Y;
    }
    let progress = 1.0 - until_hit / fall_duration;
    let y = (progress * judge_line_y as f64) as f32;
    y.clamp(OFFSCREEN_Y, GAME_HEIGHT)
}

/// Scrolling editor timeline: the judge line shows `current_ms`, later times
/// sit above it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TimelineScale {
    pub pixels_per_second: f32,
    pub zoom: f32,
    pub judge_line_y: f32,
}

impl Default for TimelineScale {
    fn default() -> Self {
        Self { pixels_per_second: PIXELS_PER_SECOND, zoom: 1.0, judge_line_y: JUDGE_LINE_Y }
    }
}

impl TimelineScale {
    pub fn with_zoom(zoom: f32) -> Self {
        Self { zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM), ..Self::default() }
    }

    #[inline(always)]
    fn px_per_ms(&self) -> f64 {
        self.pixels_per_second as f64 * self.zoom as f64 / 1000.0
    }

    pub fn time_to_y(&self, time_ms: f64, current_ms: f64) -> f32 {
        (self.judge_line_y as f64 - (time_ms - current_ms) * self.px_per_ms()) as f32
    }

    /// Inverse of [`time_to_y`](Self::time_to_y), clamped to non-negative time.
    pub fn y_to_time(&self, y: f32, current_ms: f64) -> f64 {
        let px_from_judge = (y - self.judge_line_y) as f64;
        (current_ms - px_from_judge / self.px_per_ms()).max(0.0)
    }
}
