//! WorkerPool - 同時実行数の制限（admission control）
//!
//! 容量 N の Semaphore です。slot を持っている間だけ handler を実行できます。
//! slot の数え上げがそのまま「実行中タスクの追跡」になるので、
//! `drain()` で全 slot が戻るのを待てばシャットダウン時の join になります。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One unit of pool capacity. Returned to the pool on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl Slot {
    pub fn release(self) {}
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for a free slot. `None` once the pool has been drained.
    pub async fn acquire(&self) -> Option<Slot> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        Some(Slot { _permit: permit })
    }

    /// Slots currently held.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait until every slot is back, then close the pool for good.
    pub async fn drain(&self) {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        if let Ok(permits) = Arc::clone(&self.semaphore).acquire_many_owned(all).await {
            self.semaphore.close();
            drop(permits);
        }
    }
}
