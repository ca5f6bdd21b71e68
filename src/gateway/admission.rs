//! Bounded admission for engine-bound routes.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed pool of concurrency slots for heavy requests.
#[derive(Clone, Debug)]
pub struct HeavySlots {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot, released on drop.
#[derive(Debug)]
pub struct HeavySlot {
    _permit: OwnedSemaphorePermit,
}

impl HeavySlots {
    /// Create a pool with `capacity` slots (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let slots = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            capacity: slots,
        }
    }

    /// Take a slot without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<HeavySlot> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| HeavySlot { _permit: permit })
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Total slots.
    #[must_use]
    pub const fn capacity(&self) -> usize { self.capacity }
}
