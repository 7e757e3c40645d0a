use crate::domain::models::{CalendarEvent, Note, Subtask, Task};
use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

#[derive(Debug)]
struct CacheSlot<T> {
    /// `None` until the collection has been populated at least once.
    value: Option<Vec<T>>,
    /// Set by `invalidate`; a stale value must be refetched before serving.
    stale: bool,
    /// Bumped by `cancel_outgoing` and `invalidate`. A fetch started under an
    /// older generation may not write its result back.
    fetch_generation: u64,
}

impl<T> Default for CacheSlot<T> {
    fn default() -> Self {
        Self {
            value: None,
            stale: false,
            fetch_generation: 0,
        }
    }
}

/// Point-in-time capture of a cache slot, taken before a speculative write
/// so a failed mutation can put back exactly what it found — the value and
/// the staleness bit. Restoring only the value would mark a
/// pending-refetch collection fresh again.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
    value: Option<Vec<T>>,
    stale: bool,
}

impl<T> CacheSnapshot<T> {
    pub fn rows(&self) -> Option<&[T]> {
        self.value.as_deref()
    }
}

/// Cache for one remote collection. Exposes the four primitives the
/// optimistic mutation wrapper is built on: read, write,
/// cancel-outgoing-fetches, and invalidate.
#[derive(Debug)]
pub struct CollectionCache<T> {
    name: &'static str,
    slot: Mutex<CacheSlot<T>>,
}

impl<T: Clone> CollectionCache<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(CacheSlot::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn read(&self) -> Result<Option<Vec<T>>, InfraError> {
        Ok(self.lock()?.value.clone())
    }

    pub fn is_fresh(&self) -> Result<bool, InfraError> {
        let slot = self.lock()?;
        Ok(slot.value.is_some() && !slot.stale)
    }

    /// Writes a definitive value, e.g. a speculative post-mutation
    /// collection. Clears staleness: the written value is what readers see.
    pub fn write(&self, rows: Vec<T>) -> Result<(), InfraError> {
        let mut slot = self.lock()?;
        slot.value = Some(rows);
        slot.stale = false;
        Ok(())
    }

    /// Captures the current value together with its staleness, for rollback.
    pub fn snapshot(&self) -> Result<CacheSnapshot<T>, InfraError> {
        let slot = self.lock()?;
        Ok(CacheSnapshot {
            value: slot.value.clone(),
            stale: slot.stale,
        })
    }

    /// Restores a snapshot verbatim, including the never-populated state and
    /// the staleness bit as they were when the snapshot was taken.
    pub fn restore(&self, snapshot: CacheSnapshot<T>) -> Result<(), InfraError> {
        let mut slot = self.lock()?;
        slot.value = snapshot.value;
        slot.stale = snapshot.stale;
        Ok(())
    }

    /// Drops the cached value entirely and cancels in-flight fetches, e.g.
    /// on sign-out.
    pub fn reset(&self) -> Result<(), InfraError> {
        let mut slot = self.lock()?;
        slot.value = None;
        slot.stale = false;
        slot.fetch_generation += 1;
        Ok(())
    }

    /// Invalidates in-flight refetches so a stale response cannot overwrite a
    /// later optimistic write.
    pub fn cancel_outgoing(&self) -> Result<(), InfraError> {
        let mut slot = self.lock()?;
        slot.fetch_generation += 1;
        Ok(())
    }

    /// Marks the cached value stale so the next read-through pulls
    /// authoritative state from the backend.
    pub fn invalidate(&self) -> Result<(), InfraError> {
        let mut slot = self.lock()?;
        slot.stale = true;
        slot.fetch_generation += 1;
        Ok(())
    }

    /// Starts a refetch; the returned token must be presented to
    /// `complete_fetch`.
    pub fn begin_fetch(&self) -> Result<u64, InfraError> {
        Ok(self.lock()?.fetch_generation)
    }

    /// Stores a refetch result unless the fetch was cancelled or superseded
    /// in the meantime. Returns whether the value was accepted.
    pub fn complete_fetch(&self, token: u64, rows: Vec<T>) -> Result<bool, InfraError> {
        let mut slot = self.lock()?;
        if slot.fetch_generation != token {
            return Ok(false);
        }
        slot.value = Some(rows);
        slot.stale = false;
        Ok(true)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheSlot<T>>, InfraError> {
        self.slot
            .lock()
            .map_err(|error| InfraError::State(format!("{} cache lock poisoned: {error}", self.name)))
    }
}

/// Every cached collection, constructed once and passed down explicitly so
/// tests can substitute fresh instances instead of touching global state.
#[derive(Debug)]
pub struct CacheStore {
    pub tasks: CollectionCache<Task>,
    pub subtasks: CollectionCache<Subtask>,
    pub meetings: CollectionCache<CalendarEvent>,
    pub appointments: CollectionCache<CalendarEvent>,
    pub notes: CollectionCache<Note>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            tasks: CollectionCache::new("tasks"),
            subtasks: CollectionCache::new("subtasks"),
            meetings: CollectionCache::new("meetings"),
            appointments: CollectionCache::new("appointments"),
            notes: CollectionCache::new("notes"),
        }
    }

    /// Returns every collection to the unpopulated state.
    pub fn reset_all(&self) -> Result<(), InfraError> {
        self.tasks.reset()?;
        self.subtasks.reset()?;
        self.meetings.reset()?;
        self.appointments.reset()?;
        self.notes.reset()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
