//! Per-address operation locks

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Guards held for the duration of one operation
pub struct WalletGuards {
    guards: Vec<(String, OwnedMutexGuard<()>)>,
    table: Option<LockTable>,
}

impl WalletGuards {
    pub fn none() -> Self {
        Self {
            guards: Vec::new(),
            table: None,
        }
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Drop for WalletGuards {
    fn drop(&mut self) {
        let Some(table) = self.table.take() else {
            return;
        };

        for (address, guard) in self.guards.drain(..) {
            drop(guard);
            // Only the table's own handle left: nobody holds or waits on it
            table.remove_if(&address, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

/// Async mutex per wallet address, kept only while someone holds or awaits it
#[derive(Default)]
pub struct WalletLocks {
    locks: LockTable,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every address, in sorted order so concurrent callers cannot deadlock
    pub async fn acquire(&self, addresses: &[&str]) -> WalletGuards {
        let mut sorted: Vec<&str> = addresses.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut held = WalletGuards {
            guards: Vec::with_capacity(sorted.len()),
            table: Some(self.locks.clone()),
        };
        for address in sorted {
            let lock = self
                .locks
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            held.guards.push((address.to_string(), lock.lock_owned().await));
        }

        held
    }

    /// Addresses currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_address_is_exclusive() {
        let locks = Arc::new(WalletLocks::new());
        let held = locks.acquire(&["addr-1"]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(&["addr-1"]).await.len() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        assert_eq!(contender.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_addresses_lock_once() {
        let locks = WalletLocks::new();
        let guards = locks.acquire(&["b", "a", "b"]).await;
        assert_eq!(guards.len(), 2);
    }

    #[tokio::test]
    async fn test_opposite_order_does_not_deadlock() {
        let locks = Arc::new(WalletLocks::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let pair = if i % 2 == 0 { ["a", "b"] } else { ["b", "a"] };
                let _guards = locks.acquire(&pair).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = futures::future::join_all(handles);
        let done = tokio::time::timeout(Duration::from_secs(2), all).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let locks = WalletLocks::new();
        for i in 0..50 {
            let address = format!("unknown-{}", i);
            let guards = locks.acquire(&[address.as_str()]).await;
            assert_eq!(locks.tracked(), 1);
            drop(guards);
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(WalletLocks::new());
        let held = locks.acquire(&["addr-1"]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let guards = locks.acquire(&["addr-1"]).await;
                let tracked = locks.tracked();
                drop(guards);
                tracked
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert_eq!(contender.await.unwrap(), 1);
        assert_eq!(locks.tracked(), 0);
    }
}
