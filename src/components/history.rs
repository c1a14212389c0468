use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::canvas::Dimensions;
use crate::error::EditorError;
use crate::io::{decode_blob, encode_png};

/// Default number of mask states kept for undo/redo.
pub const DEFAULT_HISTORY_CAPACITY: usize = 12;

// ============================================================================
// MASK SNAPSHOT
// ============================================================================

/// Immutable, self-describing capture of the mask at one instant.
///
/// A mask with no coverage at all is stored as [`MaskSnapshot::Empty`];
/// everything else is kept as PNG bytes.  Cloning only bumps a refcount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaskSnapshot {
    Empty,
    Encoded(Arc<[u8]>),
}

impl MaskSnapshot {
    pub fn capture(mask: &RgbaImage) -> Result<Self, EditorError> {
        if mask.pixels().all(|p| p[3] == 0) {
            return Ok(MaskSnapshot::Empty);
        }
        Ok(MaskSnapshot::Encoded(Arc::from(encode_png(mask)?)))
    }

    /// Wrap bytes that are already an encoded mask.
    pub fn from_encoded(bytes: Vec<u8>) -> Self {
        MaskSnapshot::Encoded(Arc::from(bytes))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, MaskSnapshot::Empty)
    }

    /// Materialise the snapshot.  `Empty` becomes a blank raster of `dims`.
    pub fn decode(&self, dims: Dimensions) -> Result<RgbaImage, EditorError> {
        match self {
            MaskSnapshot::Empty => Ok(RgbaImage::new(dims.width, dims.height)),
            MaskSnapshot::Encoded(bytes) => decode_blob(bytes),
        }
    }

    pub fn memory_size(&self) -> usize {
        match self {
            MaskSnapshot::Empty => 0,
            MaskSnapshot::Encoded(bytes) => bytes.len(),
        }
    }
}

// ============================================================================
// HISTORY MANAGER - bounded linear undo/redo timeline of mask snapshots
// ============================================================================

struct HistoryEntry {
    snapshot: MaskSnapshot,
    description: String,
}

/// Linear timeline of mask snapshots with a cursor.
///
/// Invariants: `cursor < entries.len() <= capacity`.  Pushing truncates
/// everything after the cursor, appends, moves the cursor to the new last
/// entry, then drops entries from the front until the timeline fits.  Once
/// the window is full the oldest edits silently become unreachable.
///
/// | capacity | before        | push | after         |
/// |----------|---------------|------|---------------|
/// | 2        | `[S0]` @0     | S1   | `[S0,S1]` @1  |
/// | 2        | `[S0,S1]` @1  | S2   | `[S1,S2]` @1  |
/// | 2        | `[S1,S2]` @0  | S3   | `[S1,S3]` @1  |
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    capacity: usize,
    /// Running total of encoded snapshot bytes.
    total_memory: usize,
}

impl HistoryManager {
    /// Start a timeline holding only `initial`.  A capacity of zero is
    /// treated as one.
    pub fn new(capacity: usize, initial: MaskSnapshot) -> Self {
        let total_memory = initial.memory_size();
        let mut entries = VecDeque::with_capacity(capacity.max(1));
        entries.push_back(HistoryEntry {
            snapshot: initial,
            description: "Initial Mask".to_string(),
        });
        Self {
            entries,
            cursor: 0,
            capacity: capacity.max(1),
            total_memory,
        }
    }

    pub fn push(&mut self, snapshot: MaskSnapshot, description: impl Into<String>) {
        // Prune the redo branch
        for entry in self.entries.drain(self.cursor + 1..) {
            self.total_memory = self.total_memory.saturating_sub(entry.snapshot.memory_size());
        }

        self.total_memory += snapshot.memory_size();
        self.entries.push_back(HistoryEntry {
            snapshot,
            description: description.into(),
        });

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if let Some(removed) = self.entries.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.snapshot.memory_size());
                evicted += 1;
            }
        }
        if evicted > 0 {
            log_info!("History window full, dropped {} oldest mask state(s)", evicted);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Record an empty mask as a new, undoable state.
    pub fn clear(&mut self) {
        self.push(MaskSnapshot::Empty, "Clear Mask");
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Step back one state and return the snapshot to restore.
    ///
    /// # Panics
    /// If [`HistoryManager::can_undo`] is false.  The UI must disable undo
    /// instead of issuing it.
    pub fn undo(&mut self) -> &MaskSnapshot {
        assert!(self.can_undo(), "undo called with nothing to undo");
        self.cursor -= 1;
        &self.entries[self.cursor].snapshot
    }

    /// Step forward one state and return the snapshot to restore.
    ///
    /// # Panics
    /// If [`HistoryManager::can_redo`] is false.
    pub fn redo(&mut self) -> &MaskSnapshot {
        assert!(self.can_redo(), "redo called with nothing to redo");
        self.cursor += 1;
        &self.entries[self.cursor].snapshot
    }

    /// The snapshot [`HistoryManager::undo`] would return, without moving.
    pub fn peek_undo(&self) -> Option<&MaskSnapshot> {
        self.can_undo()
            .then(|| &self.entries[self.cursor - 1].snapshot)
    }

    /// The snapshot [`HistoryManager::redo`] would return, without moving.
    pub fn peek_redo(&self) -> Option<&MaskSnapshot> {
        self.can_redo()
            .then(|| &self.entries[self.cursor + 1].snapshot)
    }

    pub fn current(&self) -> &MaskSnapshot {
        &self.entries[self.cursor].snapshot
    }

    /// Description of the edit an undo would revert.
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo()
            .then(|| self.entries[self.cursor].description.as_str())
    }

    /// Description of the edit a redo would re-apply.
    pub fn redo_description(&self) -> Option<&str> {
        self.can_redo()
            .then(|| self.entries[self.cursor + 1].description.as_str())
    }

    /// All descriptions, oldest first.
    pub fn descriptions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.description.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, MaskSnapshot::Empty)
    }
}
