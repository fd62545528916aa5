//! Host resolution for multi-host deployments
//!
//! A resolver picks the index of the host the next attempt goes to. The
//! connection passes the set of hosts that already failed for the current
//! request so failover never hits the same dead host twice in a row.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ClientError, Result};

/// Strategy selecting which host serves the next attempt
pub trait HostResolver: Send + Sync + fmt::Debug {
    fn host_count(&self) -> usize;

    /// Upper bound of attempts per request across all hosts
    fn max_tries(&self) -> usize;

    fn get_host_index(&self, indexes_to_filter: &HashSet<usize>) -> usize;

    /// Record a transport failure against a host
    fn mark_failed(&self, _index: usize) {}

    /// Record a successful exchange with a host
    fn mark_succeeded(&self, _index: usize) {}
}

/// Resolver strategy names accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Single,
    RoundRobin,
    Random,
    Health,
}

impl FromStr for ResolverKind {
    type Err = ClientError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ResolverKind::Single),
            "roundrobin" | "round_robin" => Ok(ResolverKind::RoundRobin),
            "random" => Ok(ResolverKind::Random),
            "health" | "health_aware" => Ok(ResolverKind::Health),
            other => Err(ClientError::InvalidArgument(format!(
                "invalid host_resolver: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    host_count: usize,
    max_tries: usize,
}

impl Limits {
    fn new(host_count: usize, max_tries: Option<usize>) -> Result<Self> {
        if host_count == 0 {
            return Err(ClientError::InvalidArgument("at least one host is required".to_string()).into());
        }

        let max_tries = max_tries.unwrap_or(host_count);
        if max_tries < host_count {
            return Err(ClientError::InvalidArgument(
                "max_tries cannot be less than `host_count`".to_string(),
            )
            .into());
        }

        Ok(Self {
            host_count,
            max_tries,
        })
    }
}

/// Pins every request to the first host
///
/// Other hosts are only used when the first one already failed for the
/// current request, lowest index first.
#[derive(Debug)]
pub struct SingleHostResolver {
    limits: Limits,
}

impl SingleHostResolver {
    pub fn new(host_count: usize, max_tries: Option<usize>) -> Result<Self> {
        Ok(Self {
            limits: Limits::new(host_count, max_tries)?,
        })
    }
}

impl HostResolver for SingleHostResolver {
    fn host_count(&self) -> usize {
        self.limits.host_count
    }

    fn max_tries(&self) -> usize {
        self.limits.max_tries
    }

    fn get_host_index(&self, indexes_to_filter: &HashSet<usize>) -> usize {
        (0..self.limits.host_count)
            .find(|i| !indexes_to_filter.contains(i))
            .unwrap_or(0)
    }
}

/// Cycles through the hosts in order, wrapping around
#[derive(Debug)]
pub struct RoundRobinHostResolver {
    limits: Limits,
    next: AtomicUsize,
}

impl RoundRobinHostResolver {
    pub fn new(host_count: usize, max_tries: Option<usize>) -> Result<Self> {
        Ok(Self {
            limits: Limits::new(host_count, max_tries)?,
            next: AtomicUsize::new(0),
        })
    }
}

impl HostResolver for RoundRobinHostResolver {
    fn host_count(&self) -> usize {
        self.limits.host_count
    }

    fn max_tries(&self) -> usize {
        self.limits.max_tries
    }

    fn get_host_index(&self, indexes_to_filter: &HashSet<usize>) -> usize {
        let count = self.limits.host_count;
        let mut index = self.next.fetch_add(1, Ordering::Relaxed) % count;

        // Skip filtered hosts, unless every host is filtered
        for _ in 0..count {
            if !indexes_to_filter.contains(&index) {
                break;
            }
            index = self.next.fetch_add(1, Ordering::Relaxed) % count;
        }
        index
    }
}

/// Uniformly random host
#[derive(Debug)]
pub struct RandomHostResolver {
    limits: Limits,
}

impl RandomHostResolver {
    pub fn new(host_count: usize, max_tries: Option<usize>) -> Result<Self> {
        Ok(Self {
            limits: Limits::new(host_count, max_tries)?,
        })
    }
}

impl HostResolver for RandomHostResolver {
    fn host_count(&self) -> usize {
        self.limits.host_count
    }

    fn max_tries(&self) -> usize {
        self.limits.max_tries
    }

    fn get_host_index(&self, indexes_to_filter: &HashSet<usize>) -> usize {
        let count = self.limits.host_count;
        let candidates: Vec<usize> = (0..count)
            .filter(|i| !indexes_to_filter.contains(i))
            .collect();

        let mut rng = rand::thread_rng();
        if candidates.is_empty() {
            rng.gen_range(0..count)
        } else {
            candidates[rng.gen_range(0..candidates.len())]
        }
    }
}

/// Wraps another resolver and avoids hosts that failed recently
///
/// A host marked failed is skipped for `cooldown`. When every host is cooling
/// down the inner resolver decides alone.
#[derive(Debug)]
pub struct HealthAwareHostResolver {
    inner: Arc<dyn HostResolver>,
    cooldown: Duration,
    failed_at: Mutex<HashMap<usize, Instant>>,
}

impl HealthAwareHostResolver {
    pub fn new(inner: Arc<dyn HostResolver>, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            failed_at: Mutex::new(HashMap::new()),
        }
    }

    /// Hosts currently inside their cool-down window
    pub fn unhealthy_hosts(&self) -> HashSet<usize> {
        let mut failed = self.failed_at.lock();
        let cooldown = self.cooldown;
        failed.retain(|_, at| at.elapsed() < cooldown);
        failed.keys().copied().collect()
    }
}

impl HostResolver for HealthAwareHostResolver {
    fn host_count(&self) -> usize {
        self.inner.host_count()
    }

    fn max_tries(&self) -> usize {
        self.inner.max_tries()
    }

    fn get_host_index(&self, indexes_to_filter: &HashSet<usize>) -> usize {
        let mut filter: HashSet<usize> = self.unhealthy_hosts();
        filter.extend(indexes_to_filter.iter().copied());

        if filter.len() >= self.host_count() {
            return self.inner.get_host_index(indexes_to_filter);
        }
        self.inner.get_host_index(&filter)
    }

    fn mark_failed(&self, index: usize) {
        tracing::debug!(host_index = index, "Host marked unhealthy");
        self.failed_at.lock().insert(index, Instant::now());
    }

    fn mark_succeeded(&self, index: usize) {
        self.failed_at.lock().remove(&index);
    }
}

/// Build the resolver for `host_count` hosts
///
/// A single host always gets [`SingleHostResolver`].
pub fn build_resolver(
    kind: ResolverKind,
    host_count: usize,
    max_tries: Option<usize>,
    cooldown: Duration,
) -> Result<Arc<dyn HostResolver>> {
    if host_count == 1 {
        return Ok(Arc::new(SingleHostResolver::new(1, max_tries)?));
    }

    let resolver: Arc<dyn HostResolver> = match kind {
        ResolverKind::Single => Arc::new(SingleHostResolver::new(host_count, max_tries)?),
        ResolverKind::RoundRobin => Arc::new(RoundRobinHostResolver::new(host_count, max_tries)?),
        ResolverKind::Random => Arc::new(RandomHostResolver::new(host_count, max_tries)?),
        ResolverKind::Health => Arc::new(HealthAwareHostResolver::new(
            Arc::new(RoundRobinHostResolver::new(host_count, max_tries)?),
            cooldown,
        )),
    };
    Ok(resolver)
}
