use crate::game::history::{ChartHistory, DEFAULT_HISTORY_SIZE};
use crate::game::note::{Lane, Note, NoteId, NoteRecord, sort_by_time, validate_notes};
use crate::game::speed::SpeedChange;
use crate::game::timing::{BpmChange, GridSnapper};
use log::{debug, info, warn};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::sync::Arc;

/// Immutable, time-ordered view of the chart. Published whole on every edit.
pub type NoteSnapshot = Arc<[Note]>;

pub const DEFAULT_HOLD_DURATION_MS: f64 = 500.0;
/// Two notes in one lane closer than this are the same note.
pub const DUPLICATE_WINDOW_MS: f64 = 1.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Tap,
    Hold,
}

#[derive(Clone, Debug)]
struct ClipNote {
    lane: Lane,
    offset: f64,
    duration: Option<f64>,
}

/// Notes copied relative to the earliest one in the selection.
#[derive(Clone, Debug, Default)]
pub struct Clipboard {
    notes: Vec<ClipNote>,
}

impl Clipboard {
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// A chart as the editor saves it. Everything but the notes is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartFile {
    pub notes: Vec<NoteRecord>,
    pub bpm: Option<f64>,
    pub bpm_changes: Vec<BpmChange>,
    pub speed_changes: Vec<SpeedChange>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChartJson {
    Bare(Vec<NoteRecord>),
    Wrapped(ChartFile),
}

impl ChartFile {
    /// Accepts either a chart object or a bare note array.
    pub fn parse(json: &str) -> Result<Self, String> {
        match serde_json::from_str::<ChartJson>(json) {
            Ok(ChartJson::Bare(notes)) => Ok(Self { notes, ..Default::default() }),
            Ok(ChartJson::Wrapped(file)) => Ok(file),
            Err(e) => Err(format!("invalid chart JSON: {e}")),
        }
    }
}

#[inline(always)]
fn occupied(notes: &[Note], lane: Lane, time: f64) -> bool {
    notes
        .iter()
        .any(|n| n.lane == lane && (n.time - time).abs() < DUPLICATE_WINDOW_MS)
}

/// True when two notes in `notes` share a lane within the duplicate window.
fn has_collision(notes: &[Note]) -> bool {
    notes.iter().enumerate().any(|(i, a)| {
        notes[i + 1..]
            .iter()
            .any(|b| a.lane == b.lane && (a.time - b.time).abs() < DUPLICATE_WINDOW_MS)
    })
}

pub struct NoteStore {
    notes: NoteSnapshot,
    next_id: u64,
    grid: GridSnapper,
    mode: InputMode,
    hold_duration_ms: Option<f64>,
    history: ChartHistory<NoteSnapshot>,
}

impl Default for NoteStore {
    fn default() -> Self {
        Self::new(GridSnapper::default())
    }
}

impl NoteStore {
    pub fn new(grid: GridSnapper) -> Self {
        Self::with_history_size(grid, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(grid: GridSnapper, history_size: usize) -> Self {
        let notes: NoteSnapshot = Arc::from(Vec::new());
        Self {
            history: ChartHistory::new(notes.clone(), history_size),
            notes,
            next_id: 1,
            grid,
            mode: InputMode::Tap,
            hold_duration_ms: None,
        }
    }

    // --- Readers ---

    /// The current chart. The returned snapshot never changes; later edits
    /// publish a new one.
    #[inline(always)]
    pub fn snapshot(&self) -> NoteSnapshot {
        self.notes.clone()
    }

    #[inline(always)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    // --- Authoring settings ---

    pub fn grid(&self) -> &GridSnapper {
        &self.grid
    }

    pub fn set_grid(&mut self, grid: GridSnapper) {
        self.grid = grid;
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        self.mode = mode;
    }

    pub fn set_hold_duration(&mut self, duration_ms: Option<f64>) {
        self.hold_duration_ms = duration_ms;
    }

    /// Configured hold length, or 500 ms when unset or unusable.
    pub fn hold_duration(&self) -> f64 {
        self.hold_duration_ms
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(DEFAULT_HOLD_DURATION_MS)
    }

    // --- Internals ---

    /// `None` once every id up to `u32::MAX` has been handed out.
    fn allocate_id(&mut self) -> Option<NoteId> {
        let id = u32::try_from(self.next_id).ok()?;
        self.next_id += 1;
        Some(NoteId(id))
    }

    fn publish(&mut self, mut notes: Vec<Note>) {
        sort_by_time(&mut notes);
        self.notes = Arc::from(notes);
        self.history.record(self.notes.clone());
    }

    /// End of a hold starting at `start`. If snapping collapses the interval
    /// the end falls back to the unsnapped `start + duration`.
    fn hold_end(&self, start: f64, duration: f64) -> f64 {
        let end = self.grid.snap(start + duration);
        if end > start { end } else { start + duration }
    }

    // --- Mutations ---

    /// Places a note at the snapped `time`. In hold mode the note gets the
    /// configured hold duration. Returns `None` when a note already sits in
    /// that lane within 1 ms, or when `time` is not finite.
    pub fn add_note(&mut self, lane: Lane, time: f64) -> Option<NoteId> {
        if !time.is_finite() {
            debug!("add_note ignored non-finite time in lane {lane}");
            return None;
        }
        let snapped = self.grid.snap(time);
        if occupied(&self.notes, lane, snapped) {
            debug!("add_note suppressed duplicate: lane={lane}, time={snapped:.3}");
            return None;
        }
        let Some(id) = self.allocate_id() else {
            warn!("add_note failed: note ids exhausted");
            return None;
        };
        let note = match self.mode {
            InputMode::Tap => Note::tap(id, lane, snapped),
            InputMode::Hold => {
                let end = self.hold_end(snapped, self.hold_duration());
                Note::hold(id, lane, snapped, end)
            }
        };
        let mut next = self.notes.to_vec();
        next.push(note);
        self.publish(next);
        Some(id)
    }

    /// Places a hold spanning a drag from `start` to `end`. The pair may come
    /// in either order.
    pub fn add_hold(&mut self, lane: Lane, start: f64, end: f64) -> Option<NoteId> {
        if !start.is_finite() || !end.is_finite() {
            debug!("add_hold ignored non-finite drag in lane {lane}");
            return None;
        }
        let (a, b) = if start <= end { (start, end) } else { (end, start) };
        let snapped_start = self.grid.snap(a);
        if occupied(&self.notes, lane, snapped_start) {
            debug!("add_hold suppressed duplicate: lane={lane}, time={snapped_start:.3}");
            return None;
        }
        let snapped_end = self.grid.snap(b);
        let end = if snapped_end > snapped_start {
            snapped_end
        } else {
            snapped_start + self.hold_duration()
        };
        let Some(id) = self.allocate_id() else {
            warn!("add_hold failed: note ids exhausted");
            return None;
        };
        let mut next = self.notes.to_vec();
        next.push(Note::hold(id, lane, snapped_start, end));
        self.publish(next);
        Some(id)
    }

    pub fn delete_note(&mut self, id: NoteId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        let next: Vec<Note> = self.notes.iter().filter(|n| n.id != id).cloned().collect();
        self.publish(next);
        true
    }

    pub fn delete_notes(&mut self, ids: &FxHashSet<NoteId>) -> usize {
        let next: Vec<Note> = self.notes.iter().filter(|n| !ids.contains(&n.id)).cloned().collect();
        let removed = self.notes.len() - next.len();
        if removed > 0 {
            self.publish(next);
        }
        removed
    }

    /// Shifts the selection by `time_offset` ms and `lane_offset` lanes.
    /// Times are re-snapped and lanes pinned to the field; holds keep their
    /// length. The whole move is rejected if it would stack two notes.
    pub fn move_notes(&mut self, ids: &FxHashSet<NoteId>, time_offset: f64, lane_offset: i32) -> usize {
        if ids.is_empty() || !time_offset.is_finite() {
            return 0;
        }
        let mut moved = 0;
        let next: Vec<Note> = self
            .notes
            .iter()
            .map(|n| {
                if !ids.contains(&n.id) {
                    return n.clone();
                }
                moved += 1;
                let time = self.grid.snap((n.time + time_offset).max(0.0));
                let mut note = n.clone();
                note.end_time = n.end_time.map(|_| time + n.duration());
                note.time = time;
                note.lane = n.lane.shifted(lane_offset);
                note
            })
            .collect();
        if moved == 0 {
            return 0;
        }
        if has_collision(&next) {
            debug!("move_notes rejected: {moved} notes would overlap existing ones");
            return 0;
        }
        self.publish(next);
        moved
    }

    /// Reflects the selection across the field (lane 0 <-> 3, 1 <-> 2).
    pub fn mirror_notes(&mut self, ids: &FxHashSet<NoteId>) -> usize {
        let mut mirrored = 0;
        let next: Vec<Note> = self
            .notes
            .iter()
            .map(|n| {
                let mut note = n.clone();
                if ids.contains(&n.id) {
                    note.lane = n.lane.mirrored();
                    mirrored += 1;
                }
                note
            })
            .collect();
        if mirrored == 0 {
            return 0;
        }
        if has_collision(&next) {
            debug!("mirror_notes rejected: {mirrored} notes would overlap existing ones");
            return 0;
        }
        self.publish(next);
        mirrored
    }

    pub fn copy(&self, ids: &FxHashSet<NoteId>) -> Clipboard {
        let selected: Vec<&Note> = self.notes.iter().filter(|n| ids.contains(&n.id)).collect();
        let Some(origin) = selected.iter().map(|n| n.time).reduce(f64::min) else {
            return Clipboard::default();
        };
        Clipboard {
            notes: selected
                .into_iter()
                .map(|n| ClipNote {
                    lane: n.lane,
                    offset: n.time - origin,
                    duration: n.is_hold().then(|| n.duration()).filter(|d| *d > 0.0),
                })
                .collect(),
        }
    }

    /// Pastes the clipboard with its earliest note at the snapped `at`.
    /// Notes landing on an occupied slot are dropped; the rest get fresh ids.
    pub fn paste(&mut self, clipboard: &Clipboard, at: f64) -> Vec<NoteId> {
        if clipboard.is_empty() || !at.is_finite() {
            return Vec::new();
        }
        let anchor = self.grid.snap(at);
        let mut next = self.notes.to_vec();
        let mut pasted = Vec::with_capacity(clipboard.len());
        for clip in &clipboard.notes {
            let time = anchor + clip.offset;
            if occupied(&next, clip.lane, time) {
                debug!("paste dropped duplicate: lane={}, time={time:.3}", clip.lane);
                continue;
            }
            let Some(id) = self.allocate_id() else {
                warn!("paste stopped after {} notes: note ids exhausted", pasted.len());
                break;
            };
            next.push(match clip.duration {
                Some(d) => Note::hold(id, clip.lane, time, time + d),
                None => Note::tap(id, clip.lane, time),
            });
            pasted.push(id);
        }
        if !pasted.is_empty() {
            self.publish(next);
        }
        pasted
    }

    /// Replaces the chart with validated imported notes and clears history.
    /// Imported duplicates keep the first occurrence.
    pub fn restore(&mut self, records: &[NoteRecord]) -> usize {
        let validated = validate_notes(records);
        let max_id = validated.iter().map(|n| n.id.0).max().unwrap_or(0);
        let mut notes: Vec<Note> = Vec::with_capacity(validated.len());
        for note in validated {
            if occupied(&notes, note.lane, note.time) {
                debug!("restore dropped duplicate {} in lane {}", note.id, note.lane);
                continue;
            }
            notes.push(note);
        }
        self.next_id = self.next_id.max(u64::from(max_id) + 1);
        self.notes = Arc::from(notes);
        self.history.reset(self.notes.clone());
        info!("Restored chart with {} notes (next id {}).", self.notes.len(), self.next_id);
        self.notes.len()
    }

    /// Accepts either `{"notes": [...]}` or a bare note array. Tempo and
    /// speed fields are ignored here; see [`ChartFile`].
    pub fn restore_json(&mut self, json: &str) -> Result<usize, String> {
        let file = ChartFile::parse(json)?;
        Ok(self.restore(&file.notes))
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some(snapshot) => {
                self.notes = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some(snapshot) => {
                self.notes = snapshot;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }
}
