use std::collections::{HashMap, VecDeque};

use post_tracker_core_types::{Classification, DateKey};

/// Where a remembered event was counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub date_key: DateKey,
    pub classification: Classification,
}

/// Bounded FIFO of recently applied event identities.
///
/// Lives as long as the ledger that owns it and is never persisted. Oldest
/// identities are evicted once `capacity` is exceeded; retracted identities
/// leave immediately.
#[derive(Debug)]
pub struct RecentEventMemory {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, MemoryEntry>,
}

impl RecentEventMemory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(65_536)),
            entries: HashMap::with_capacity(capacity.min(65_536)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.entries.contains_key(event_id)
    }

    pub fn get(&self, event_id: &str) -> Option<MemoryEntry> {
        self.entries.get(event_id).copied()
    }

    /// Records an identity, evicting the oldest ones past capacity.
    /// Re-recording a known identity only refreshes its entry.
    pub fn remember(&mut self, event_id: String, entry: MemoryEntry) {
        if let Some(existing) = self.entries.get_mut(&event_id) {
            *existing = entry;
            return;
        }
        self.entries.insert(event_id.clone(), entry);
        self.order.push_back(event_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn forget(&mut self, event_id: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(event_id)?;
        if let Some(position) = self.order.iter().position(|id| id == event_id) {
            self.order.remove(position);
        }
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// Memory edits staged while an event is applied; committed only once the
/// counters have been written.
#[derive(Debug, Default)]
pub(crate) struct MemoryChanges {
    pub forget: Vec<String>,
    pub remember: Option<(String, MemoryEntry)>,
}

impl MemoryChanges {
    pub fn commit(self, memory: &mut RecentEventMemory) {
        for event_id in &self.forget {
            memory.forget(event_id);
        }
        if let Some((event_id, entry)) = self.remember {
            memory.remember(event_id, entry);
        }
    }
}
