use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// A parcel's mutex and the number of callers holding or queued on it.
#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<tokio::sync::Mutex<()>>,
    holders: usize,
}

/// Keyed async mutexes, one per parcel with an operation in flight.
#[derive(Debug, Default)]
pub struct ParcelLocks {
    slots: Mutex<HashMap<Uuid, Slot>>,
}

/// Held for the duration of one lifecycle operation.
pub struct ParcelLockGuard<'a> {
    _held: OwnedMutexGuard<()>,
    _lease: SlotLease<'a>,
}

/// One caller's claim on a slot, taken before queueing. Released on drop whether the
/// caller got the lock or was cancelled while waiting.
struct SlotLease<'a> {
    registry: &'a ParcelLocks,
    parcel_id: Uuid,
}

impl ParcelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn lock(&self, parcel_id: Uuid) -> ParcelLockGuard<'_> {
        let (lease, mutex) = {
            let mut slots = self.slots();
            let slot = slots.entry(parcel_id).or_default();
            slot.holders += 1;
            let lease = SlotLease {
                registry: self,
                parcel_id,
            };
            (lease, slot.mutex.clone())
        };
        let held = mutex.lock_owned().await;
        ParcelLockGuard {
            _held: held,
            _lease: lease,
        }
    }

    /// Number of parcels that currently have a slot.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SlotLease<'_> {
    fn drop(&mut self) {
        let mut slots = self.registry.slots();
        let idle = match slots.get_mut(&self.parcel_id) {
            Some(slot) => {
                slot.holders = slot.holders.saturating_sub(1);
                slot.holders == 0
            }
            None => false,
        };
        if idle {
            slots.remove(&self.parcel_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn slot_is_pruned_after_release() {
        let locks = ParcelLocks::new();
        let id = Uuid::new_v4();
        {
            let _guard = locks.lock(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_parcel_is_serialized() {
        let locks = Arc::new(ParcelLocks::new());
        let id = Uuid::new_v4();
        let first = locks.lock(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(locks.len(), 1);

        drop(first);
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_slot() {
        let locks = Arc::new(ParcelLocks::new());
        let id = Uuid::new_v4();
        let first = locks.lock(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        // Wake the waiter and cancel it before it gets to run.
        drop(first);
        waiter.abort();
        let joined = waiter.await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn queued_waiter_cancelled_before_release() {
        let locks = Arc::new(ParcelLocks::new());
        let id = Uuid::new_v4();
        let first = locks.lock(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;
        assert_eq!(locks.len(), 1);

        drop(first);
        assert!(locks.is_empty());
        let _again = locks.lock(id).await;
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn different_parcels_do_not_block() {
        let locks = ParcelLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
