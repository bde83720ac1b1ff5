use serde::Deserialize;

// --- Grid quantization ---
// All times are milliseconds. Snapping never yields a negative or non-finite
// time; when no usable grid exists the input passes through clamped to zero.

pub const MS_PER_MINUTE: f64 = 60_000.0;

#[inline(always)]
fn clamp_non_negative(time: f64) -> f64 {
    if time.is_nan() { 0.0 } else { time.max(0.0) }
}

/// Quantizes `time` to the nearest `1 / grid_division` subdivision of a beat.
///
/// `beat_duration` may be unknown (`None`) or non-positive, in which case the
/// grid is a no-op. `grid_division` is clamped to at least 1 and may be
/// fractional.
pub fn snap(time: f64, beat_duration: Option<f64>, grid_division: f64) -> f64 {
    let Some(beat) = beat_duration.filter(|b| *b > 0.0) else {
        return clamp_non_negative(time);
    };
    let interval = beat / usable_division(grid_division);
    if interval == 0.0 || !interval.is_finite() {
        return clamp_non_negative(time);
    }
    clamp_non_negative((time / interval).round() * interval)
}

/// `None` when the tempo is unknown.
#[inline(always)]
pub fn bpm_to_beat_duration(bpm: f64) -> Option<f64> {
    if bpm.is_finite() && bpm > 0.0 { Some(MS_PER_MINUTE / bpm) } else { None }
}

#[inline(always)]
fn usable_division(grid_division: f64) -> f64 {
    if grid_division.is_nan() { 1.0 } else { grid_division.max(1.0) }
}

// --- Tempo changes ---

/// Tempo change as the editor stores it: from beat `beat_index` on, the
/// chart runs at `bpm`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BpmChange {
    pub beat_index: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoSegment {
    start_ms: f64,
    start_beat: f64,
    /// `None` when the segment's tempo is unusable; no grid from here on.
    beat_duration: Option<f64>,
}

/// Piecewise-constant tempo over chart time. The first segment starts at 0
/// with the base tempo. A segment with an unusable tempo has no grid, and
/// since its length in ms is unknown every later change is unreachable.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    segments: Vec<TempoSegment>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(None)
    }
}

impl TempoMap {
    pub fn constant(beat_duration_ms: Option<f64>) -> Self {
        Self {
            segments: vec![TempoSegment {
                start_ms: 0.0,
                start_beat: 0.0,
                beat_duration: beat_duration_ms.filter(|b| b.is_finite() && *b > 0.0),
            }],
        }
    }

    /// Changes may come in any order. Changes at negative or non-finite beats
    /// are ignored; a change on the same beat as an earlier one replaces it.
    pub fn new(base_bpm: f64, changes: &[BpmChange]) -> Self {
        let mut sorted: Vec<&BpmChange> = changes
            .iter()
            .filter(|c| c.beat_index.is_finite() && c.beat_index >= 0.0)
            .collect();
        sorted.sort_by(|a, b| a.beat_index.total_cmp(&b.beat_index));

        let mut map = Self::constant(bpm_to_beat_duration(base_bpm));
        for change in sorted {
            let last_idx = map.segments.len() - 1;
            let last = map.segments[last_idx];
            if change.beat_index <= last.start_beat {
                map.segments[last_idx].beat_duration = bpm_to_beat_duration(change.bpm);
                continue;
            }
            let Some(beat) = last.beat_duration else {
                break;
            };
            map.segments.push(TempoSegment {
                start_ms: last.start_ms + (change.beat_index - last.start_beat) * beat,
                start_beat: change.beat_index,
                beat_duration: bpm_to_beat_duration(change.bpm),
            });
        }
        map
    }

    #[inline(always)]
    fn index_at(&self, time: f64) -> usize {
        self.segments.partition_point(|s| s.start_ms <= time).saturating_sub(1)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn beat_duration_at(&self, time: f64) -> Option<f64> {
        self.segments[self.index_at(clamp_non_negative(time))].beat_duration
    }

    /// Snaps within the segment containing `time`, on a grid anchored at the
    /// segment start. Results never cross into the next segment.
    pub fn snap(&self, time: f64, grid_division: f64) -> f64 {
        let t = clamp_non_negative(time);
        let i = self.index_at(t);
        let seg = self.segments[i];
        if seg.beat_duration.is_none() {
            return t;
        }
        let snapped = seg.start_ms + snap(t - seg.start_ms, seg.beat_duration, grid_division);
        match self.segments.get(i + 1) {
            Some(next) if snapped >= next.start_ms => next.start_ms,
            _ => snapped,
        }
    }

    pub fn time_to_beat(&self, time: f64) -> Option<f64> {
        let t = clamp_non_negative(time);
        let seg = self.segments[self.index_at(t)];
        let beat = seg.beat_duration?;
        Some(seg.start_beat + (t - seg.start_ms) / beat)
    }

    pub fn beat_to_time(&self, beat_index: f64) -> Option<f64> {
        if beat_index.is_nan() {
            return None;
        }
        let b = beat_index.max(0.0);
        let i = self.segments.partition_point(|s| s.start_beat <= b).saturating_sub(1);
        let seg = self.segments[i];
        let beat = seg.beat_duration?;
        Some(seg.start_ms + (b - seg.start_beat) * beat)
    }
}

/// The editor's current grid: tempo map and subdivisions per beat.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapper {
    pub tempo: TempoMap,
    pub grid_division: f64,
}

impl Default for GridSnapper {
    fn default() -> Self {
        Self { tempo: TempoMap::default(), grid_division: 4.0 }
    }
}

impl GridSnapper {
    pub fn new(beat_duration_ms: Option<f64>, grid_division: f64) -> Self {
        Self::with_tempo(TempoMap::constant(beat_duration_ms), grid_division)
    }

    pub fn from_bpm(bpm: f64, grid_division: f64) -> Self {
        Self::new(bpm_to_beat_duration(bpm), grid_division)
    }

    pub fn with_tempo(tempo: TempoMap, grid_division: f64) -> Self {
        Self { tempo, grid_division }
    }

    #[inline(always)]
    pub fn snap(&self, time: f64) -> f64 {
        self.tempo.snap(time, self.grid_division)
    }

    #[inline(always)]
    pub fn beat_duration_at(&self, time: f64) -> Option<f64> {
        self.tempo.beat_duration_at(time)
    }

    /// Length of one grid cell at `time`, if the grid is usable there.
    pub fn interval_at(&self, time: f64) -> Option<f64> {
        let interval = self.beat_duration_at(time)? / usable_division(self.grid_division);
        (interval > 0.0 && interval.is_finite()).then_some(interval)
    }
}
