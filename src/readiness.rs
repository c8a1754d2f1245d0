//! ReadinessProbe (spec.md §4.H) — classifies the backend into
//! `healthy | partial | unavailable`, cached briefly to avoid hammering the
//! backend. Modeled as "a single initialised value with thread-safe read
//! and an explicit refresh operation" (spec.md §9 "Global state" design
//! note), styled after the sliding-window bookkeeping in the teacher's
//! `RateLimiter` (`src/coordinator/core.rs`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{BackendError, LlmBackend, ReadinessStatus};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// `healthy`: installed and authenticated, loop may start freely.
/// `partial`: runs with a warning (e.g. degraded capability reported).
/// `unavailable`: short-circuits the loop straight to FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessClass {
    Healthy,
    Partial,
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Readiness {
    pub class: ReadinessClass,
    pub status: ReadinessStatus,
    pub error: Option<String>,
    /// Machine-stable kind for the user-visible `errorKind` contract
    /// (spec.md §7), set whenever `class` is `Unavailable`.
    pub error_kind: Option<&'static str>,
}

impl Readiness {
    pub fn can_proceed(&self) -> bool {
        self.class != ReadinessClass::Unavailable
    }
}

fn classify(status: Result<ReadinessStatus, BackendError>) -> Readiness {
    match status {
        Ok(status) if status.installed && status.auth_ready && !status.degraded => Readiness {
            class: ReadinessClass::Healthy,
            status,
            error: None,
            error_kind: None,
        },
        Ok(status) if status.can_proceed => Readiness {
            class: ReadinessClass::Partial,
            status,
            error: None,
            error_kind: None,
        },
        Ok(status) => {
            let error_kind = if !status.installed {
                "BackendNotInstalled"
            } else if !status.auth_ready {
                "AuthRequired"
            } else {
                "BackendInternal"
            };
            Readiness {
                class: ReadinessClass::Unavailable,
                status,
                error: None,
                error_kind: Some(error_kind),
            }
        }
        Err(e) => Readiness {
            class: ReadinessClass::Unavailable,
            error_kind: Some(e.kind()),
            status: ReadinessStatus::default(),
            error: Some(e.to_string()),
        },
    }
}

struct CachedReadiness {
    readiness: Readiness,
    checked_at: Instant,
}

/// Thread-safe, briefly-cached wrapper around `LlmBackend::probe_readiness`.
pub struct ReadinessProbe {
    backend: Arc<dyn LlmBackend>,
    ttl: Duration,
    cached: Mutex<Option<CachedReadiness>>,
}

impl ReadinessProbe {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            ttl: DEFAULT_CACHE_TTL,
            cached: Mutex::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the cached classification if still fresh, otherwise probes
    /// the backend and refreshes the cache.
    pub async fn check(&self) -> Readiness {
        debug!("ReadinessProbe::check: called");
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.checked_at.elapsed() < self.ttl {
                debug!("ReadinessProbe::check: returning cached readiness");
                return entry.readiness.clone();
            }
        }
        let readiness = self.refresh_locked().await;
        *cached = Some(CachedReadiness {
            readiness: readiness.clone(),
            checked_at: Instant::now(),
        });
        readiness
    }

    /// Force a fresh probe regardless of cache age.
    pub async fn refresh(&self) -> Readiness {
        debug!("ReadinessProbe::refresh: called");
        let readiness = self.refresh_locked().await;
        let mut cached = self.cached.lock().await;
        *cached = Some(CachedReadiness {
            readiness: readiness.clone(),
            checked_at: Instant::now(),
        });
        readiness
    }

    async fn refresh_locked(&self) -> Readiness {
        classify(self.backend.probe_readiness().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockBackend;

    #[tokio::test]
    async fn healthy_when_installed_and_authed() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let probe = ReadinessProbe::new(backend);
        let readiness = probe.check().await;
        assert_eq!(readiness.class, ReadinessClass::Healthy);
        assert!(readiness.can_proceed());
    }

    #[tokio::test]
    async fn unavailable_when_not_installed() {
        let backend = Arc::new(MockBackend::new(vec![]).with_readiness(ReadinessStatus {
            installed: false,
            auth_ready: false,
            issues: vec!["not found".into()],
            can_proceed: false,
            degraded: false,
        }));
        let probe = ReadinessProbe::new(backend);
        let readiness = probe.check().await;
        assert_eq!(readiness.class, ReadinessClass::Unavailable);
        assert!(!readiness.can_proceed());
    }

    #[tokio::test]
    async fn partial_when_degraded_but_can_proceed() {
        let backend = Arc::new(MockBackend::new(vec![]).with_readiness(ReadinessStatus {
            installed: true,
            auth_ready: true,
            issues: vec!["degraded mode".into()],
            can_proceed: true,
            degraded: true,
        }));
        let probe = ReadinessProbe::new(backend);
        let readiness = probe.check().await;
        assert_eq!(readiness.class, ReadinessClass::Partial);
    }

    #[tokio::test]
    async fn caches_within_ttl() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let probe = ReadinessProbe::new(backend).with_ttl(Duration::from_secs(60));
        let first = probe.check().await;
        let second = probe.check().await;
        assert_eq!(first.class, second.class);
    }
}
