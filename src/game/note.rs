use log::warn;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const NUM_LANES: u8 = 4;

/// Holds shorter than this are imported as taps.
pub const MIN_HOLD_DURATION_MS: f64 = 50.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Lane(u8);

impl Lane {
    pub const ALL: [Lane; NUM_LANES as usize] = [Lane(0), Lane(1), Lane(2), Lane(3)];

    #[inline(always)]
    pub const fn new(index: u8) -> Option<Self> {
        if index < NUM_LANES { Some(Self(index)) } else { None }
    }

    /// Out-of-range indices are pinned to the outermost lanes.
    #[inline(always)]
    pub fn clamped(index: i32) -> Self {
        Self(index.clamp(0, NUM_LANES as i32 - 1) as u8)
    }

    #[inline(always)]
    pub const fn index(self) -> u8 {
        self.0
    }

    #[inline(always)]
    pub const fn mirrored(self) -> Self {
        Self(NUM_LANES - 1 - self.0)
    }

    #[inline(always)]
    pub fn shifted(self, delta: i32) -> Self {
        Self::clamped(self.0 as i32 + delta)
    }
}

impl TryFrom<u8> for Lane {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Lane::new(value).ok_or_else(|| format!("lane {value} out of range 0..{NUM_LANES}"))
    }
}

impl From<Lane> for u8 {
    fn from(lane: Lane) -> u8 {
        lane.0
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[default]
    Tap,
    Hold,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub u32);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub lane: Lane,
    #[serde(rename = "type", default)]
    pub kind: NoteType,
    /// Hit time in ms.
    pub time: f64,
    #[serde(rename = "endTime", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    // Render-only, rewritten every frame.
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub hit: bool,
}

impl Note {
    pub fn tap(id: NoteId, lane: Lane, time: f64) -> Self {
        Self { id, lane, kind: NoteType::Tap, time, end_time: None, y: 0.0, hit: false }
    }

    pub fn hold(id: NoteId, lane: Lane, time: f64, end_time: f64) -> Self {
        Self {
            id,
            lane,
            kind: NoteType::Hold,
            time,
            end_time: Some(end_time),
            y: 0.0,
            hit: false,
        }
    }

    #[inline(always)]
    pub fn is_hold(&self) -> bool {
        self.kind == NoteType::Hold
    }

    /// The instant the note stops being playable: `end_time` for holds, `time` otherwise.
    #[inline(always)]
    pub fn end_or_time(&self) -> f64 {
        self.end_time.unwrap_or(self.time)
    }

    #[inline(always)]
    pub fn duration(&self) -> f64 {
        (self.end_or_time() - self.time).max(0.0)
    }

    /// Authoring state only; `y` and `hit` are runtime fields.
    pub fn same_placement(&self, other: &Note) -> bool {
        self.id == other.id
            && self.lane == other.lane
            && self.kind == other.kind
            && self.time == other.time
            && self.end_time == other.end_time
    }
}

/// Loose form of a note as the editor exports it. Every field but `lane` may be
/// missing or inconsistent; [`validate_notes`] turns these into [`Note`]s.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NoteRecord {
    #[serde(default)]
    pub id: Option<u32>,
    pub lane: Lane,
    #[serde(rename = "type", default)]
    pub kind: Option<NoteType>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(rename = "endTime", default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

impl NoteRecord {
    fn normalize(&self) -> Option<Note> {
        let time = self.time?;
        if !time.is_finite() || time < 0.0 {
            return None;
        }
        let id = NoteId(self.id.unwrap_or(0));
        let duration = self
            .end_time
            .filter(|e| e.is_finite())
            .map(|e| e - time)
            .or(self.duration.filter(|d| d.is_finite()))
            .unwrap_or(0.0);
        let wants_hold = self.kind == Some(NoteType::Hold) || duration > 0.0;
        if wants_hold && duration >= MIN_HOLD_DURATION_MS {
            Some(Note::hold(id, self.lane, time, time + duration))
        } else {
            Some(Note::tap(id, self.lane, time))
        }
    }
}

/// Normalizes imported notes: negative or non-finite times are dropped,
/// degenerate or too-short holds become taps, the result is sorted by time.
///
/// Ids come out unique. Records without an id, or repeating one already
/// taken, get fresh ids past the highest kept id. If that would leave no room
/// below `u32::MAX` for later notes, the whole import is renumbered from 1 in
/// record order.
pub fn validate_notes(records: &[NoteRecord]) -> Vec<Note> {
    let mut kept: Vec<(Note, Option<u32>)> = records
        .iter()
        .filter_map(|r| r.normalize().map(|n| (n, r.id)))
        .collect();

    let mut seen = FxHashSet::default();
    let mut fresh = Vec::new();
    for (i, (_, id)) in kept.iter().enumerate() {
        match id {
            Some(id) if seen.insert(*id) => {}
            _ => fresh.push(i),
        }
    }

    let first_free = seen.iter().max().map_or(1, |&m| u64::from(m) + 1);
    if first_free + fresh.len() as u64 > u64::from(u32::MAX) {
        warn!("Imported note ids leave no room for new notes; renumbering {} notes.", kept.len());
        for (i, (note, _)) in kept.iter_mut().enumerate() {
            note.id = NoteId(i as u32 + 1);
        }
    } else {
        for (k, &i) in fresh.iter().enumerate() {
            kept[i].0.id = NoteId((first_free + k as u64) as u32);
        }
    }

    let mut notes: Vec<Note> = kept.into_iter().map(|(note, _)| note).collect();
    sort_by_time(&mut notes);
    notes
}

#[inline(always)]
pub fn sort_by_time(notes: &mut [Note]) {
    notes.sort_by(|a, b| a.time.total_cmp(&b.time));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(lane: u8, time: f64) -> NoteRecord {
        NoteRecord { lane: Lane::new(lane).unwrap(), time: Some(time), ..Default::default() }
    }

    #[test]
    fn lane_mirror_and_shift_stay_in_range() {
        assert_eq!(Lane::new(0).unwrap().mirrored(), Lane::new(3).unwrap());
        assert_eq!(Lane::new(1).unwrap().mirrored(), Lane::new(2).unwrap());
        assert_eq!(Lane::new(2).unwrap().shifted(5), Lane::new(3).unwrap());
        assert_eq!(Lane::new(1).unwrap().shifted(-4), Lane::new(0).unwrap());
        assert!(Lane::new(4).is_none());
    }

    #[test]
    fn validation_converts_degenerate_holds_to_taps() {
        let mut backwards = record(0, 1000.0);
        backwards.kind = Some(NoteType::Hold);
        backwards.end_time = Some(900.0);
        let mut short = record(1, 2000.0);
        short.kind = Some(NoteType::Hold);
        short.duration = Some(20.0);
        let mut good = record(2, 3000.0);
        good.kind = Some(NoteType::Hold);
        good.duration = Some(400.0);

        let notes = validate_notes(&[backwards, short, good]);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].kind, NoteType::Tap);
        assert_eq!(notes[0].end_time, None);
        assert_eq!(notes[1].kind, NoteType::Tap);
        assert_eq!(notes[2].kind, NoteType::Hold);
        assert_eq!(notes[2].end_time, Some(3400.0));
    }

    #[test]
    fn validation_drops_negative_and_nan_times_and_sorts() {
        let notes = validate_notes(&[
            record(0, 500.0),
            record(1, -10.0),
            record(2, f64::NAN),
            record(3, 100.0),
        ]);
        let times: Vec<f64> = notes.iter().map(|n| n.time).collect();
        assert_eq!(times, vec![100.0, 500.0]);
    }

    #[test]
    fn validation_assigns_ids_past_the_highest_existing() {
        let mut a = record(0, 0.0);
        a.id = Some(7);
        let b = record(1, 10.0);
        let notes = validate_notes(&[a, b]);
        assert_eq!(notes[0].id, NoteId(7));
        assert_eq!(notes[1].id, NoteId(8));
    }

    #[test]
    fn repeated_ids_are_reassigned() {
        let mut a = record(0, 0.0);
        a.id = Some(5);
        let mut b = record(1, 0.0);
        b.id = Some(5);
        let mut c = record(2, 50.0);
        c.id = Some(2);
        let notes = validate_notes(&[a, b, c]);
        let ids: Vec<u32> = notes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![5, 6, 2]);
        assert!(notes[0].same_placement(&Note::tap(NoteId(5), Lane::new(0).unwrap(), 0.0)));
    }

    #[test]
    fn ids_at_the_top_of_the_range_force_a_renumber() {
        let mut a = record(0, 300.0);
        a.id = Some(u32::MAX);
        let mut b = record(1, 100.0);
        b.id = Some(7);
        let c = record(2, 200.0);
        let notes = validate_notes(&[a, b, c]);
        let ids: Vec<u32> = notes.iter().map(|n| n.id.0).collect();
        assert_eq!(ids, vec![2, 3, 1], "renumbered in record order, then sorted by time");
    }

    #[test]
    fn editor_json_parses_into_records() {
        let json = r#"[{"id":3,"lane":2,"type":"hold","time":1000,"endTime":1600,"y":0,"hit":false}]"#;
        let records: Vec<NoteRecord> = serde_json::from_str(json).unwrap();
        let notes = validate_notes(&records);
        assert_eq!(notes[0].lane.index(), 2);
        assert!(notes[0].is_hold());
        assert_eq!(notes[0].duration(), 600.0);
    }
}
