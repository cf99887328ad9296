use std::collections::VecDeque;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::errors::AddJobError;

/// A unique identifier for a job in a Caller's stash.
///
/// The `index` part is recycled once a job settles; every reuse bumps the
/// `generation`, so a notification addressed to a settled job can never be
/// mistaken for one addressed to a later job that reuses the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

impl JobId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    generation: u32,
    live: bool,
}

/// Allocates and recycles [JobId]s.
///
/// Freed indices are reused oldest-first, which maximizes the time before a
/// given index comes back into circulation.
#[derive(Debug, Default)]
pub struct JobIdSpace {
    slots: Vec<Slot>,
    free: VecDeque<u32>,
    num_live: usize,
}

impl JobIdSpace {
    /// returns an id that is not currently live.
    pub fn allocate(&mut self) -> Result<JobId, AddJobError> {
        let id = if let Some(index) = self.free.pop_front() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.live = true;
            JobId::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).map_err(|_| AddJobError::IdSpaceExhausted)?;
            self.slots.push(Slot {
                generation: 0,
                live: true,
            });
            JobId::new(index, 0)
        };

        self.num_live += 1;
        Ok(id)
    }

    /// makes the id's index eligible for reuse.  An index whose generations
    /// are used up is retired instead.
    ///
    /// returns false if the id is stale or was already freed.
    pub fn free(&mut self, id: JobId) -> bool {
        if !self.is_live(id) {
            return false;
        }

        self.slots[id.index as usize].live = false;
        if id.generation < u32::MAX {
            self.free.push_back(id.index);
        } else {
            debug!("retiring job index {}: generations exhausted", id.index);
        }
        self.num_live -= 1;
        true
    }

    pub fn is_live(&self, id: JobId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.live && slot.generation == id.generation)
    }

    pub fn len(&self) -> usize {
        self.num_live
    }

    pub fn is_empty(&self) -> bool {
        self.num_live == 0
    }
}
