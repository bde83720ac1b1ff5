use std::collections::VecDeque;

pub const DEFAULT_HISTORY_SIZE: usize = 50;

/// Bounded linear history of whole-chart snapshots.
///
/// The entry at `index` is the state currently on screen. Recording after an
/// undo discards everything past `index`; overflow drops the oldest entry.
#[derive(Debug, Clone)]
pub struct ChartHistory<T: Clone> {
    entries: VecDeque<T>,
    index: usize,
    max_size: usize,
}

impl<T: Clone> ChartHistory<T> {
    pub fn new(initial: T, max_size: usize) -> Self {
        let mut entries = VecDeque::with_capacity(max_size.max(1));
        entries.push_back(initial);
        Self { entries, index: 0, max_size: max_size.max(1) }
    }

    pub fn record(&mut self, state: T) {
        self.entries.truncate(self.index + 1);
        self.entries.push_back(state);
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<T> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index).cloned()
    }

    pub fn redo(&mut self) -> Option<T> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index).cloned()
    }

    pub fn reset(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push_back(initial);
        self.index = 0;
    }

    #[inline(always)]
    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    #[inline(always)]
    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
