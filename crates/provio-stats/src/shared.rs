//! Mutex-serialized stats table for hosts that intercept from several threads.

use crate::error::{Result, StatsError};
use crate::table::StatsTable;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SharedStats {
    inner: Arc<Mutex<StatsTable>>,
}

impl SharedStats {
    pub fn new(table: StatsTable) -> Self {
        Self { inner: Arc::new(Mutex::new(table)) }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, StatsTable>> {
        self.inner.lock().map_err(|_| StatsError::LockPoisoned)
    }

    pub fn accumulate(&self, key: &str, delta: Duration) -> Result<Duration> {
        self.lock()?.accumulate(key, delta)
    }

    pub fn get(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.lock()?.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provio_core::StatsGrowth;
    use std::thread;

    #[test]
    fn concurrent_accumulation_is_serialized() {
        let stats = SharedStats::new(StatsTable::with_capacity(32, StatsGrowth::Fixed).unwrap());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.accumulate("dataset_read", Duration::from_micros(1)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(
            stats.get("dataset_read").unwrap(),
            Some(Duration::from_micros(400))
        );
    }
}
