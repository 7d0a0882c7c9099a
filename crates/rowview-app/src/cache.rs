//! Lazily computed, single-flight memo cell.
//!
//! The cell is `Empty`, `Loading` (one load in flight, shared by every caller
//! that arrives meanwhile) or `Loaded`. Every [`invalidate`](MaterializationCache::invalidate)
//! bumps a generation counter; a load only installs its value if the cell
//! still holds that load's flight and the generation it started under.
//! Otherwise the value is handed to the callers that waited for it and then
//! dropped, so a value that was stale at installation time is never cached.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Loader used to materialize the cached value.
pub type Loader<T, E> = Box<dyn Fn() -> Result<T, E> + Send + Sync>;

/// Marker error: the load a caller waited on panicked before completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abandoned;

/// Memo cell holding at most one value, computed on demand.
pub struct MaterializationCache<T, E> {
    loader: Loader<T, E>,
    state: Mutex<CellState<T, E>>,
}

struct CellState<T, E> {
    slot: Slot<T, E>,
    generation: u64,
}

enum Slot<T, E> {
    Empty,
    Loading(Arc<Flight<T, E>>),
    Loaded(Arc<T>),
}

struct Flight<T, E> {
    outcome: Mutex<Option<Result<Arc<T>, E>>>,
    done: Condvar,
}

impl<T, E: Clone> Flight<T, E> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Arc<T>, E> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut outcome);
        }
    }

    fn complete(&self, result: Result<Arc<T>, E>) {
        *self.outcome.lock() = Some(result);
        self.done.notify_all();
    }
}

impl<T, E> MaterializationCache<T, E>
where
    E: Clone + From<Abandoned>,
{
    /// Create an empty cell around `loader`.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            state: Mutex::new(CellState {
                slot: Slot::Empty,
                generation: 0,
            }),
        }
    }

    /// Return the cached value, loading it first if the cell is empty.
    ///
    /// Concurrent callers on an empty cell share a single load and all receive
    /// its result or its error.
    ///
    /// # Errors
    /// Returns the loader's error; failed loads leave the cell empty.
    pub fn get(&self) -> Result<Arc<T>, E> {
        let (flight, generation) = {
            let mut state = self.state.lock();
            match &state.slot {
                Slot::Loaded(value) => return Ok(Arc::clone(value)),
                Slot::Loading(flight) => {
                    let flight = Arc::clone(flight);
                    drop(state);
                    return flight.wait();
                }
                Slot::Empty => {
                    let flight = Arc::new(Flight::new());
                    state.slot = Slot::Loading(Arc::clone(&flight));
                    (flight, state.generation)
                }
            }
        };

        let mut guard = LoadGuard {
            cache: self,
            flight,
            generation,
            finished: false,
        };
        let started = Instant::now();
        debug!(generation, "Materializing view");
        let result = (self.loader)().map(Arc::new);
        debug!(
            generation,
            ok = result.is_ok(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Materialization finished"
        );
        guard.finish(result.clone());
        result
    }

    /// Return the cached value only if it is already loaded.
    pub fn peek(&self) -> Option<Arc<T>> {
        match &self.state.lock().slot {
            Slot::Loaded(value) => Some(Arc::clone(value)),
            Slot::Empty | Slot::Loading(_) => None,
        }
    }

    /// Drop the cached value. Loads already in flight will not install theirs.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.slot = Slot::Empty;
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Returns true while a load is in flight.
    pub fn is_loading(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Loading(_))
    }

    fn install(&self, flight: &Arc<Flight<T, E>>, generation: u64, result: Result<Arc<T>, E>) {
        {
            let mut state = self.state.lock();
            let current = matches!(&state.slot, Slot::Loading(active) if Arc::ptr_eq(active, flight));
            if current {
                state.slot = match &result {
                    Ok(value) if state.generation == generation => Slot::Loaded(Arc::clone(value)),
                    _ => Slot::Empty,
                };
            } else {
                debug!(generation, "Discarding load result of an invalidated view");
            }
        }
        flight.complete(result);
    }
}

impl<T, E> fmt::Debug for MaterializationCache<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        let slot = match state.slot {
            Slot::Empty => "empty",
            Slot::Loading(_) => "loading",
            Slot::Loaded(_) => "loaded",
        };
        f.debug_struct("MaterializationCache")
            .field("slot", &slot)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}

struct LoadGuard<'a, T, E>
where
    E: Clone + From<Abandoned>,
{
    cache: &'a MaterializationCache<T, E>,
    flight: Arc<Flight<T, E>>,
    generation: u64,
    finished: bool,
}

impl<T, E> LoadGuard<'_, T, E>
where
    E: Clone + From<Abandoned>,
{
    fn finish(&mut self, result: Result<Arc<T>, E>) {
        self.finished = true;
        self.cache.install(&self.flight, self.generation, result);
    }
}

impl<T, E> Drop for LoadGuard<'_, T, E>
where
    E: Clone + From<Abandoned>,
{
    fn drop(&mut self) {
        if !self.finished {
            self.cache
                .install(&self.flight, self.generation, Err(E::from(Abandoned)));
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum TestError {
        Failed(usize),
        Abandoned,
    }

    impl From<Abandoned> for TestError {
        fn from(_: Abandoned) -> Self {
            Self::Abandoned
        }
    }

    fn counting_cache(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> MaterializationCache<usize, TestError> {
        let calls = Arc::clone(calls);
        MaterializationCache::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(delay);
            Ok(n)
        })
    }

    #[test]
    fn concurrent_gets_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, Duration::from_millis(50));
        let barrier = Barrier::new(8);

        let values: Vec<usize> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        *cache.get().expect("load succeeds")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("no panic")).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|&v| v == 1));
    }

    #[test]
    fn sequential_gets_return_the_same_value() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, Duration::ZERO);

        let first = cache.get().expect("load");
        let second = cache.get().expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn invalidate_forces_exactly_one_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, Duration::ZERO);

        assert_eq!(*cache.get().expect("load"), 1);
        cache.invalidate();
        cache.invalidate();
        assert!(cache.peek().is_none());
        assert_eq!(*cache.get().expect("reload"), 2);
        assert_eq!(*cache.get().expect("cached"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn peek_never_loads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(&calls, Duration::ZERO);

        assert!(cache.peek().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        cache.get().expect("load");
        assert_eq!(cache.peek().as_deref(), Some(&1));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: MaterializationCache<usize, TestError> = MaterializationCache::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 { Err(TestError::Failed(n)) } else { Ok(n) }
        });

        assert_eq!(cache.get(), Err(TestError::Failed(1)));
        assert!(cache.peek().is_none());
        assert!(!cache.is_loading());
        assert_eq!(*cache.get().expect("second load succeeds"), 2);
    }

    #[test]
    fn concurrent_waiters_share_a_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: MaterializationCache<usize, TestError> = MaterializationCache::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            thread::sleep(Duration::from_millis(100));
            Err(TestError::Failed(n))
        });
        let barrier = Barrier::new(8);

        let results: Vec<Result<Arc<usize>, TestError>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.get()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("no panic")).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Err(TestError::Failed(1))));
        assert!(cache.peek().is_none());
        assert!(!cache.is_loading());
    }

    #[test]
    fn load_finishing_after_invalidate_is_discarded() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let started_tx = Mutex::new(started_tx);

        let cache: MaterializationCache<usize, TestError> = MaterializationCache::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                started_tx.lock().send(()).expect("signal start");
                release_rx.lock().recv().expect("wait for release");
            }
            Ok(n)
        });

        thread::scope(|scope| {
            let pending = scope.spawn(|| cache.get());
            started_rx.recv().expect("load started");
            assert!(cache.is_loading());
            cache.invalidate();
            release_tx.send(()).expect("release load");
            // the in-flight caller still receives its own result
            assert_eq!(*pending.join().expect("no panic").expect("load ok"), 1);
        });

        assert!(cache.peek().is_none());
        assert_eq!(*cache.get().expect("fresh load"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_loader_releases_waiters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: MaterializationCache<usize, TestError> = MaterializationCache::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            assert!(n > 1, "first load blows up");
            Ok(n)
        });

        let outcome = thread::scope(|scope| scope.spawn(|| cache.get()).join());
        assert!(outcome.is_err());
        assert!(!cache.is_loading());
        assert_eq!(*cache.get().expect("next load works"), 2);
    }
}
