use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::util::lock_unpoisoned;

const PER_HOST_LIMITER_ENTRY_TTL: Duration = Duration::from_secs(300);
const PER_HOST_LIMITER_MAX_ENTRIES: usize = 1024;

/// Bounds concurrent exchanges overall and per `host:port`.
#[derive(Clone)]
pub(crate) struct ConnectionLimiters {
    global: Option<Arc<Semaphore>>,
    per_host_limit: Option<usize>,
    per_host: Arc<Mutex<BTreeMap<String, PerHostLimiterEntry>>>,
}

struct PerHostLimiterEntry {
    semaphore: Arc<Semaphore>,
    limit: usize,
    last_used_at: Instant,
}

impl PerHostLimiterEntry {
    fn is_idle(&self) -> bool {
        self.semaphore.available_permits() == self.limit
    }
}

/// Held for the duration of one exchange.
#[derive(Debug)]
pub(crate) struct ConnectionPermits {
    _global: Option<OwnedSemaphorePermit>,
    _host: Option<OwnedSemaphorePermit>,
}

impl ConnectionLimiters {
    /// Zero disables the corresponding bound.
    pub(crate) fn new(max_connections: usize, max_connections_per_host: usize) -> Self {
        Self {
            global: (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections))),
            per_host_limit: (max_connections_per_host > 0).then_some(max_connections_per_host),
            per_host: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub(crate) async fn acquire(&self, host_key: &str) -> Result<ConnectionPermits, AcquireError> {
        let global = match &self.global {
            Some(semaphore) => Some(semaphore.clone().acquire_owned().await?),
            None => None,
        };

        let host = match self.per_host_limit {
            Some(limit) => {
                let semaphore = {
                    let mut guard = lock_unpoisoned(&self.per_host);
                    let now = Instant::now();
                    cleanup_stale_per_host_limiters(&mut guard, now);
                    let entry = guard
                        .entry(host_key.to_ascii_lowercase())
                        .or_insert_with(|| PerHostLimiterEntry {
                            semaphore: Arc::new(Semaphore::new(limit)),
                            limit,
                            last_used_at: now,
                        });
                    entry.last_used_at = now;
                    entry.semaphore.clone()
                };
                Some(semaphore.acquire_owned().await?)
            }
            None => None,
        };

        Ok(ConnectionPermits {
            _global: global,
            _host: host,
        })
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        lock_unpoisoned(&self.per_host).len()
    }
}

fn cleanup_stale_per_host_limiters(
    entries: &mut BTreeMap<String, PerHostLimiterEntry>,
    now: Instant,
) {
    entries.retain(|_, entry| {
        !entry.is_idle() || now.duration_since(entry.last_used_at) <= PER_HOST_LIMITER_ENTRY_TTL
    });

    while entries.len() > PER_HOST_LIMITER_MAX_ENTRIES {
        let oldest_key = entries
            .iter()
            .filter(|(_, entry)| entry.is_idle())
            .min_by_key(|(_, entry)| entry.last_used_at)
            .map(|(host, _)| host.clone());
        let Some(oldest_key) = oldest_key else {
            break;
        };
        entries.remove(&oldest_key);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ConnectionLimiters;

    #[tokio::test]
    async fn per_host_permit_blocks_second_exchange_until_released() {
        let limiters = ConnectionLimiters::new(0, 1);
        let first = limiters.acquire("vcloud.example.com:443").await.expect("first");

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            limiters.acquire("VCLOUD.example.com:443"),
        )
        .await;
        assert!(blocked.is_err(), "second permit must wait for the first");

        let other_host = tokio::time::timeout(
            Duration::from_millis(50),
            limiters.acquire("elb.example.com:443"),
        )
        .await;
        assert!(other_host.is_ok(), "other hosts are not affected");

        drop(first);
        let second = tokio::time::timeout(
            Duration::from_millis(50),
            limiters.acquire("vcloud.example.com:443"),
        )
        .await;
        assert!(second.is_ok());
        assert_eq!(limiters.tracked_hosts(), 2);
    }

    #[tokio::test]
    async fn global_limit_applies_across_hosts() {
        let limiters = ConnectionLimiters::new(1, 0);
        let _held = limiters.acquire("a.example.com:80").await.expect("first");
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            limiters.acquire("b.example.com:80"),
        )
        .await;
        assert!(blocked.is_err());
    }
}
