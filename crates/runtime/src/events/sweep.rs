//! Budgeted mark-and-sweep over a buffered population.

use std::collections::{HashMap, HashSet};

use item_core::StableId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Visit {
    New,
    Changed,
    Unchanged,
}

/// Cursor into a buffered copy of the population.
///
/// A pass walks the buffer a chunk at a time. Identities visited during the
/// pass are recorded; when the cursor reaches the end, known identities that
/// were not visited are swept out. The buffer is refilled for the next pass.
#[derive(Debug)]
pub(crate) struct SweepCursor<T, V> {
    buffer: Vec<T>,
    cursor: usize,
    known: HashMap<StableId, (T, V)>,
    seen: HashSet<StableId>,
}

impl<T: Clone, V: PartialEq> SweepCursor<T, V> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            cursor: 0,
            known: HashMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.buffer.len()
    }

    pub fn refill(&mut self, population: Vec<T>) {
        self.buffer = population;
        self.cursor = 0;
        self.seen.clear();
    }

    pub fn next_chunk(&mut self, budget: usize) -> Vec<T> {
        let end = (self.cursor + budget).min(self.buffer.len());
        let chunk = self.buffer[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    /// Records `id` as present in this pass with content `value`.
    pub fn visit(&mut self, id: StableId, item: T, value: V) -> Visit {
        self.seen.insert(id);
        let changed = self.known.get(&id).map(|(_, previous)| *previous != value);
        self.known.insert(id, (item, value));
        match changed {
            None => Visit::New,
            Some(true) => Visit::Changed,
            Some(false) => Visit::Unchanged,
        }
    }

    /// Keeps a known identity alive for this pass without updating it.
    pub fn touch(&mut self, id: StableId) {
        if self.known.contains_key(&id) {
            self.seen.insert(id);
        }
    }

    pub fn forget(&mut self, id: StableId) -> Option<T> {
        self.seen.remove(&id);
        self.known.remove(&id).map(|(item, _)| item)
    }

    /// Ends the pass, returning the items that were not seen during it.
    pub fn finish_pass(&mut self) -> Vec<T> {
        let gone: Vec<StableId> = self
            .known
            .keys()
            .filter(|id| !self.seen.contains(*id))
            .copied()
            .collect();
        gone.into_iter()
            .filter_map(|id| self.known.remove(&id).map(|(item, _)| item))
            .collect()
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> StableId {
        StableId(n)
    }

    #[test]
    fn test_visit_detects_new_and_changed() {
        let mut sweep: SweepCursor<u64, i32> = SweepCursor::new();
        assert_eq!(sweep.visit(id(1), 1, 10), Visit::New);
        assert_eq!(sweep.visit(id(1), 1, 10), Visit::Unchanged);
        assert_eq!(sweep.visit(id(1), 1, 11), Visit::Changed);
    }

    #[test]
    fn test_chunks_respect_budget() {
        let mut sweep: SweepCursor<u64, ()> = SweepCursor::new();
        sweep.refill((0..10).collect());
        assert_eq!(sweep.next_chunk(4), vec![0, 1, 2, 3]);
        assert_eq!(sweep.next_chunk(4), vec![4, 5, 6, 7]);
        assert!(!sweep.is_exhausted());
        assert_eq!(sweep.next_chunk(4), vec![8, 9]);
        assert!(sweep.is_exhausted());
    }

    #[test]
    fn test_finish_pass_sweeps_unseen() {
        let mut sweep: SweepCursor<u64, ()> = SweepCursor::new();
        sweep.refill(vec![1, 2, 3]);
        for n in sweep.next_chunk(8) {
            sweep.visit(id(n), n, ());
        }
        assert!(sweep.finish_pass().is_empty());

        sweep.refill(vec![1, 3]);
        for n in sweep.next_chunk(8) {
            sweep.visit(id(n), n, ());
        }
        assert_eq!(sweep.finish_pass(), vec![2]);
        assert_eq!(sweep.known_count(), 2);
    }
}
