use crate::game::sync::LeadOffset;
use serde::Deserialize;

/// Scroll-speed section: notes due in `[start_ms, end_ms)` fall as if the
/// chart ran at `bpm`. An open end lasts to the end of the chart.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SpeedChange {
    #[serde(rename = "startTimeMs")]
    pub start_ms: f64,
    #[serde(rename = "endTimeMs", default)]
    pub end_ms: Option<f64>,
    pub bpm: f64,
}

impl SpeedChange {
    #[inline(always)]
    fn covers(&self, time: f64) -> bool {
        time >= self.start_ms && self.end_ms.is_none_or(|end| time < end)
    }
}

#[inline(always)]
fn usable(bpm: f64) -> Option<f64> {
    (bpm.is_finite() && bpm > 0.0).then_some(bpm)
}

/// Speed sections over note time, relative to the chart's base tempo.
/// Overlapping sections resolve to the one that starts last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedMap {
    base_bpm: f64,
    changes: Vec<SpeedChange>,
}

impl SpeedMap {
    /// Sections with a non-finite start are ignored.
    pub fn new(base_bpm: f64, changes: &[SpeedChange]) -> Self {
        let mut changes: Vec<SpeedChange> = changes.iter().copied().filter(|c| c.start_ms.is_finite()).collect();
        changes.sort_by(|a, b| a.start_ms.total_cmp(&b.start_ms));
        Self { base_bpm, changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn effective_bpm(&self, time_ms: f64) -> f64 {
        let mut bpm = self.base_bpm;
        for change in &self.changes {
            if time_ms < change.start_ms {
                break;
            }
            if change.covers(time_ms) {
                bpm = change.bpm;
            }
        }
        bpm
    }

    /// How much faster than the base tempo notes scroll at `time_ms`.
    /// 1.0 whenever either tempo is unusable.
    pub fn scroll_multiplier(&self, time_ms: f64) -> f64 {
        match (usable(self.base_bpm), usable(self.effective_bpm(time_ms))) {
            (Some(base), Some(bpm)) => bpm / base,
            _ => 1.0,
        }
    }

    /// Fall duration for a note due at `note_time_ms`, scaled by the speed
    /// section that note sits in.
    pub fn fall_duration_ms(&self, note_time_ms: f64, base_fall_ms: f64) -> f64 {
        if !(base_fall_ms > 0.0) {
            return base_fall_ms;
        }
        base_fall_ms / self.scroll_multiplier(note_time_ms)
    }

    /// Moves the sections onto the fall clock of a session starting at
    /// `start_ms`, the same way preview notes are moved. Sections that end
    /// before the start are dropped.
    pub fn rebased(&self, lead: LeadOffset, start_ms: f64) -> Self {
        let changes = self
            .changes
            .iter()
            .filter(|c| c.end_ms.is_none_or(|end| end > start_ms))
            .map(|c| SpeedChange {
                start_ms: lead.relative_start(c.start_ms, start_ms),
                end_ms: c.end_ms.map(|end| lead.relative_start(end, start_ms)),
                bpm: c.bpm,
            })
            .collect();
        Self { base_bpm: self.base_bpm, changes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(start_ms: f64, end_ms: Option<f64>, bpm: f64) -> SpeedChange {
        SpeedChange { start_ms, end_ms, bpm }
    }

    fn sample() -> SpeedMap {
        SpeedMap::new(120.0, &[section(3000.0, None, 60.0), section(1000.0, Some(2000.0), 180.0)])
    }

    #[test]
    fn effective_bpm_follows_sections() {
        let map = sample();
        assert_eq!(map.effective_bpm(500.0), 120.0);
        assert_eq!(map.effective_bpm(1000.0), 180.0);
        assert_eq!(map.effective_bpm(1999.0), 180.0);
        assert_eq!(map.effective_bpm(2000.0), 120.0, "section end is exclusive");
        assert_eq!(map.effective_bpm(50_000.0), 60.0, "open section runs to the end");
    }

    #[test]
    fn later_section_wins_on_overlap() {
        let map = SpeedMap::new(120.0, &[section(1000.0, Some(2000.0), 180.0), section(0.0, None, 90.0)]);
        assert_eq!(map.effective_bpm(1500.0), 180.0);
        assert_eq!(map.effective_bpm(2500.0), 90.0);
    }

    #[test]
    fn fall_duration_scales_inversely_with_speed() {
        let map = sample();
        assert_eq!(map.scroll_multiplier(1500.0), 1.5);
        assert!((map.fall_duration_ms(1500.0, 2000.0) - 2000.0 / 1.5).abs() < 1e-9);
        assert_eq!(map.fall_duration_ms(4000.0, 2000.0), 4000.0);
        assert_eq!(map.fall_duration_ms(500.0, 2000.0), 2000.0);
    }

    #[test]
    fn unusable_tempos_leave_the_fall_alone() {
        let no_base = SpeedMap::new(0.0, &[section(0.0, None, 240.0)]);
        assert_eq!(no_base.scroll_multiplier(100.0), 1.0);
        let stopped = SpeedMap::new(120.0, &[section(0.0, None, 0.0), section(f64::NAN, None, 60.0)]);
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped.fall_duration_ms(100.0, 2000.0), 2000.0);
    }

    #[test]
    fn rebase_moves_sections_with_the_notes() {
        let map = SpeedMap::new(
            120.0,
            &[section(0.0, Some(500.0), 60.0), section(500.0, None, 90.0), section(1500.0, Some(2500.0), 240.0)],
        );
        let lead = LeadOffset::from_ms(3000.0);
        let rebased = map.rebased(lead, 1000.0);
        assert_eq!(rebased.len(), 2, "the section ending before the start is gone");
        assert_eq!(rebased.effective_bpm(3000.0), 90.0);
        assert_eq!(rebased.effective_bpm(3500.0), 240.0);
        assert_eq!(rebased.effective_bpm(4500.0), 90.0);
        assert_eq!(
            rebased.effective_bpm(lead.relative_start(2000.0, 1000.0)),
            map.effective_bpm(2000.0),
            "a note keeps its speed after rebasing"
        );
    }
}
