//! Resolver Pool
//!
//! Fixed set of worker threads draining a FIFO of resolution requests.
//!
//! Each request gets its own id; results are parked in a map keyed by that id
//! until the matching `take_result` collects them, so concurrent callers can
//! never receive each other's tracks. Completion order across requests is
//! unspecified.
//!
//! A failing (or panicking) resolver only fails its own request; workers
//! always go back to the queue.

use crate::error::{Error, ResolutionError, Result};
use crate::resolver::MediaResolver;
use partyq_common::{Track, User};
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identity of one submitted resolution
pub type RequestId = Uuid;

/// Outcome delivered to the submitter
pub type ResolutionResult = std::result::Result<Track, ResolutionError>;

/// Pending resolution request
#[derive(Debug, Clone)]
struct ResolveRequest {
    id: RequestId,
    reference: String,
    requester: User,
}

/// Shared state for resolver pool
struct SharedPoolState {
    /// Requests not yet picked up by a worker
    pending: Mutex<VecDeque<ResolveRequest>>,

    /// Notifies workers of new work or shutdown
    work_ready: Condvar,

    /// Finished results awaiting their submitter
    results: Mutex<HashMap<RequestId, ResolutionResult>>,

    /// Notifies submitters blocked in take_result
    result_ready: Condvar,

    /// Stop flag for shutdown
    stop_flag: AtomicBool,

    /// Set once workers are joined: no further results will ever arrive
    drained: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Multi-threaded resolver pool
pub struct ResolverPool {
    /// Shared state between threads
    state: Arc<SharedPoolState>,

    /// Worker thread handles
    threads: Mutex<Vec<JoinHandle<()>>>,

    worker_count: usize,
}

impl ResolverPool {
    /// Create the pool and start `worker_count` workers (at least one)
    pub fn new(resolver: Arc<dyn MediaResolver>, worker_count: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let state = Arc::new(SharedPoolState {
            pending: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            results: Mutex::new(HashMap::new()),
            result_ready: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            drained: AtomicBool::new(false),
        });

        let mut threads = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let state_clone = Arc::clone(&state);
            let resolver_clone = Arc::clone(&resolver);

            let handle = thread::Builder::new()
                .name(format!("resolver-{}", worker_id))
                .spawn(move || Self::worker_loop(worker_id, state_clone, resolver_clone))?;

            threads.push(handle);
        }

        info!("Resolver pool started with {} worker threads", worker_count);

        Ok(Self {
            state,
            threads: Mutex::new(threads),
            worker_count,
        })
    }

    /// Queue a resolution; never blocks on resolver work
    pub fn submit(&self, reference: &str, requester: &User) -> Result<RequestId> {
        if self.state.stop_flag.load(Ordering::Acquire) {
            return Err(Error::ShutDown("resolver pool"));
        }

        let request = ResolveRequest {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            requester: requester.clone(),
        };
        let id = request.id;

        debug!("Submitting resolution {} for {} ({})", id, reference, requester);

        lock(&self.state.pending).push_back(request);
        self.state.work_ready.notify_one();

        Ok(id)
    }

    /// Block until the result for `id` is available and take it
    ///
    /// Returns `PoolShutdown` if the pool stops before the request ran.
    pub fn take_result(&self, id: RequestId) -> ResolutionResult {
        let mut results = lock(&self.state.results);
        loop {
            if let Some(result) = results.remove(&id) {
                return result;
            }
            if self.state.drained.load(Ordering::Acquire) {
                return Err(ResolutionError::PoolShutdown);
            }
            results = self
                .state
                .result_ready
                .wait(results)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `take_result`, giving up after `timeout`
    ///
    /// On timeout the request keeps running and its result can still be taken later.
    pub fn take_result_timeout(
        &self,
        id: RequestId,
        timeout: Duration,
    ) -> Option<ResolutionResult> {
        let deadline = Instant::now() + timeout;
        let mut results = lock(&self.state.results);
        loop {
            if let Some(result) = results.remove(&id) {
                return Some(result);
            }
            if self.state.drained.load(Ordering::Acquire) {
                return Some(Err(ResolutionError::PoolShutdown));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            results = self
                .state
                .result_ready
                .wait_timeout(results, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Submit and wait in one call
    pub fn resolve(&self, reference: &str, requester: &User) -> ResolutionResult {
        let id = self
            .submit(reference, requester)
            .map_err(|_| ResolutionError::PoolShutdown)?;
        self.take_result(id)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Worker thread main loop
    fn worker_loop(
        worker_id: usize,
        state: Arc<SharedPoolState>,
        resolver: Arc<dyn MediaResolver>,
    ) {
        debug!("Worker {} started", worker_id);

        loop {
            let request = {
                let mut pending = lock(&state.pending);

                // Wait for work or shutdown signal
                while pending.is_empty() && !state.stop_flag.load(Ordering::Acquire) {
                    pending = state
                        .work_ready
                        .wait(pending)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                if state.stop_flag.load(Ordering::Acquire) {
                    debug!("Worker {} received shutdown signal", worker_id);
                    break;
                }

                pending.pop_front()
            };

            let Some(request) = request else {
                continue;
            };

            debug!(
                "Worker {} resolving {} (request {})",
                worker_id, request.reference, request.id
            );

            let result = Self::resolve_guarded(resolver.as_ref(), &request);
            match &result {
                Ok(track) => info!("Resolved {}: {}", request.reference, track),
                Err(e) => warn!("Resolution of {} failed: {}", request.reference, e),
            }

            lock(&state.results).insert(request.id, result);
            state.result_ready.notify_all();
        }

        debug!("Worker {} stopped", worker_id);
    }

    /// Run the resolver, turning a panic into an error value
    fn resolve_guarded(resolver: &dyn MediaResolver, request: &ResolveRequest) -> ResolutionResult {
        panic::catch_unwind(AssertUnwindSafe(|| {
            resolver.resolve(&request.reference, &request.requester)
        }))
        .unwrap_or_else(|payload| {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "resolver panicked".to_string());
            error!("Resolver panicked on {}: {}", request.reference, detail);
            Err(ResolutionError::Internal(detail))
        })
    }

    /// Stop accepting work and join the workers
    ///
    /// Requests already picked up run to completion first; requests still
    /// pending are dropped and their waiters receive `PoolShutdown`.
    pub fn shutdown(&self) {
        if self.state.stop_flag.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down resolver pool");

        self.state.work_ready.notify_all();

        let threads: Vec<_> = lock(&self.threads).drain(..).collect();
        for (idx, handle) in threads.into_iter().enumerate() {
            match handle.join() {
                Ok(_) => debug!("Worker {} joined successfully", idx),
                Err(e) => error!("Worker {} join failed: {:?}", idx, e),
            }
        }

        let dropped = {
            let mut pending = lock(&self.state.pending);
            let n = pending.len();
            pending.clear();
            n
        };
        if dropped > 0 {
            warn!("Dropped {} unstarted resolution requests", dropped);
        }

        // Wake submitters so they observe the shutdown
        let _guard = lock(&self.state.results);
        self.state.drained.store(true, Ordering::Release);
        self.state.result_ready.notify_all();

        info!("Resolver pool shut down");
    }
}

impl Drop for ResolverPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Echo resolver: succeeds unless the reference starts with "bad", panics on "panic"
    struct EchoResolver {
        calls: AtomicUsize,
    }

    impl MediaResolver for EchoResolver {
        fn resolve(&self, reference: &str, requester: &User) -> ResolutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if reference.starts_with("panic") {
                panic!("boom on {}", reference);
            }
            if reference.starts_with("bad") {
                return Err(ResolutionError::Unsupported(reference.to_string()));
            }
            if let Some(ms) = reference.strip_prefix("sleep-") {
                thread::sleep(Duration::from_millis(ms.parse().unwrap()));
            }
            Ok(Track::resolved(
                reference,
                format!("/cache/{}.mp3", reference),
                reference,
                requester.clone(),
            ))
        }
    }

    fn pool(workers: usize) -> (ResolverPool, Arc<EchoResolver>) {
        let resolver = Arc::new(EchoResolver {
            calls: AtomicUsize::new(0),
        });
        let pool = ResolverPool::new(resolver.clone(), workers).unwrap();
        (pool, resolver)
    }

    #[test]
    fn test_pool_creation() {
        let (pool, _) = pool(3);
        assert_eq!(pool.worker_count(), 3);
        assert_eq!(pool.threads.lock().unwrap().len(), 3);
        pool.shutdown();
        assert!(pool.threads.lock().unwrap().is_empty());
    }

    #[test]
    fn test_zero_workers_clamped_to_one() {
        let (pool, _) = pool(0);
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_result_keyed_by_request() {
        let (pool, _) = pool(4);
        let alice = User::new("1", "@alice");
        let bob = User::new("2", "@bob");

        let slow = pool.submit("sleep-150", &alice).unwrap();
        let fast = pool.submit("sleep-1", &bob).unwrap();

        // Take in submission order even though "fast" finishes first
        let slow_track = pool.take_result(slow).unwrap();
        let fast_track = pool.take_result(fast).unwrap();

        assert_eq!(slow_track.source_reference(), Some("sleep-150"));
        assert_eq!(slow_track.requested_by(), &alice);
        assert_eq!(fast_track.source_reference(), Some("sleep-1"));
        assert_eq!(fast_track.requested_by(), &bob);
    }

    #[test]
    fn test_failure_is_a_value() {
        let (pool, _) = pool(2);
        let result = pool.resolve("bad-link", &User::default());
        assert_eq!(result, Err(ResolutionError::Unsupported("bad-link".to_string())));

        // Pool still works afterwards
        assert!(pool.resolve("good", &User::default()).is_ok());
    }

    #[test]
    fn test_panic_does_not_kill_worker() {
        let (pool, resolver) = pool(1);

        let result = pool.resolve("panic-now", &User::default());
        assert!(matches!(result, Err(ResolutionError::Internal(ref d)) if d.contains("boom")));

        // The single worker survived the panic
        assert!(pool.resolve("after", &User::default()).is_ok());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_take_result_timeout_leaves_result_collectable() {
        let (pool, _) = pool(1);
        let id = pool.submit("sleep-100", &User::default()).unwrap();

        assert!(pool.take_result_timeout(id, Duration::from_millis(5)).is_none());
        let late = pool.take_result_timeout(id, Duration::from_secs(5)).unwrap();
        assert!(late.is_ok());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let (pool, _) = pool(1);
        pool.shutdown();

        assert!(matches!(pool.submit("x", &User::default()), Err(Error::ShutDown(_))));
        assert_eq!(pool.resolve("x", &User::default()), Err(ResolutionError::PoolShutdown));
    }
}
