//! Background garbage collector.
//!
//! Every Object created by an evaluator is registered with [`emplace`],
//! which pushes it onto a pending forest under a short-held mutex. A scan
//! iteration then:
//!
//! 1. drops every scanned Object whose only remaining holder is the
//!    collector (acyclic garbage);
//! 2. swaps the pending forest out under the mutex and merges it in O(1);
//! 3. every `trace_every` scans, stops the world and releases tracked
//!    cycles that no root reaches (see [`trace`]).
//!
//! Scans run on a dedicated thread started with the process context, or
//! synchronously through [`GarbageCollector::collect`].
//!
//! [`emplace`]: GarbageCollector::emplace

pub mod forest;
mod trace;

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::config::GcConfig;
use crate::modules::ModuleTable;
use crate::object::{Id, Object};
use forest::Forest;

/// An Object held by the collector, ordered by identity.
pub(crate) struct Tracked(Object);

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.0.id() == other.0.id()
    }
}

impl Eq for Tracked {}

impl PartialOrd for Tracked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tracked {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.id().cmp(&other.0.id())
    }
}

/// Outcome of one scan iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Objects released because nothing else held them
    pub released: usize,
    /// Objects released by the cycle trace
    pub reclaimed: usize,
    /// Objects still tracked after the scan
    pub tracked: usize,
}

/// Cumulative collector counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Completed scan iterations
    pub scans: u64,
    /// Objects released by the reference count check
    pub released: u64,
    /// Objects released by the cycle trace
    pub reclaimed: u64,
    /// Objects tracked at the end of the last scan
    pub tracked: usize,
}

/// Held by a mutator while it runs a step; the cycle trace waits for every
/// guard to drop before inspecting the object graph.
pub struct MutatorGuard<'a> {
    _world: RwLockReadGuard<'a, ()>,
}

struct Scanner {
    forest: Forest<Tracked>,
    iteration: u64,
}

struct Shared {
    config: GcConfig,
    pending: Mutex<Forest<Tracked>>,
    scanner: Mutex<Scanner>,
    running: AtomicBool,
    world: RwLock<()>,
    modules: Arc<ModuleTable>,
    scans: AtomicU64,
    released: AtomicU64,
    reclaimed: AtomicU64,
    tracked: AtomicUsize,
}

/// The process's garbage collector.
pub struct GarbageCollector {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl GarbageCollector {
    /// Start a collector over the given module table.
    ///
    /// With `config.background` a scan thread is spawned; if spawning fails
    /// the collector falls back to manual scans.
    pub fn start(config: GcConfig, modules: Arc<ModuleTable>) -> Self {
        let background = config.background;
        let shared = Arc::new(Shared {
            config,
            pending: Mutex::new(Forest::new()),
            scanner: Mutex::new(Scanner {
                forest: Forest::new(),
                iteration: 0,
            }),
            running: AtomicBool::new(background),
            world: RwLock::new(()),
            modules,
            scans: AtomicU64::new(0),
            released: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            tracked: AtomicUsize::new(0),
        });

        let thread = if background {
            let worker = Arc::clone(&shared);
            match thread::Builder::new()
                .name("entmoot-gc".to_string())
                .spawn(move || worker.run())
            {
                Ok(handle) => Some(handle),
                Err(error) => {
                    tracing::warn!(%error, "failed to spawn collector thread; scans are manual");
                    shared.running.store(false, Ordering::Release);
                    None
                }
            }
        } else {
            None
        };

        GarbageCollector {
            shared,
            thread: Mutex::new(thread),
        }
    }

    /// Register an Object. Never waits on a running scan.
    pub fn emplace(&self, object: Object) {
        self.shared.pending.lock().push(Tracked(object));
    }

    /// Pin the object graph for the duration of one mutator step.
    ///
    /// Evaluators pin around every step. Host threads that rewire
    /// attributes of tracked Objects while evaluators or scans run must
    /// hold a pin across each write too; the cycle trace only excludes
    /// pinned writers.
    pub fn pin(&self) -> MutatorGuard<'_> {
        MutatorGuard {
            _world: self.shared.world.read_recursive(),
        }
    }

    /// One scan iteration without the cycle trace.
    pub fn scan(&self) -> ScanReport {
        self.shared.scan(false)
    }

    /// One scan iteration followed by the cycle trace.
    ///
    /// Must not be called while the calling thread holds a [`MutatorGuard`].
    pub fn collect(&self) -> ScanReport {
        self.shared.scan(true)
    }

    /// Cumulative counters.
    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            scans: self.shared.scans.load(Ordering::Acquire),
            released: self.shared.released.load(Ordering::Acquire),
            reclaimed: self.shared.reclaimed.load(Ordering::Acquire),
            tracked: self.shared.tracked.load(Ordering::Acquire),
        }
    }

    /// Whether the background thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stop and join the background thread. Idempotent.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.lock().take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("collector thread panicked");
            }
        }
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn run(&self) {
        tracing::debug!("collector thread started");
        while self.running.load(Ordering::Acquire) {
            let trace = {
                let every = u64::from(self.config.trace_every);
                every != 0 && (self.scans.load(Ordering::Acquire) + 1) % every == 0
            };
            self.scan(trace);
            thread::park_timeout(self.config.scan_interval);
        }
        tracing::debug!("collector thread stopped");
    }

    #[tracing::instrument(level = "trace", skip(self))]
    fn scan(&self, trace: bool) -> ScanReport {
        let mut scanner = self.scanner.lock();
        scanner.iteration += 1;

        let released = scanner.forest.retain(|tracked| tracked.0.use_count() > 1);
        let released_count = released.len();
        drop(released);

        let incoming = std::mem::take(&mut *self.pending.lock());
        scanner.forest.merge(incoming);

        let reclaimed = if trace {
            self.trace(&mut scanner.forest)
        } else {
            0
        };

        let report = ScanReport {
            released: released_count,
            reclaimed,
            tracked: scanner.forest.len(),
        };
        self.scans.fetch_add(1, Ordering::AcqRel);
        self.released
            .fetch_add(released_count as u64, Ordering::AcqRel);
        self.reclaimed.fetch_add(reclaimed as u64, Ordering::AcqRel);
        self.tracked.store(report.tracked, Ordering::Release);
        if report.released + report.reclaimed > 0 {
            tracing::debug!(
                iteration = scanner.iteration,
                released = report.released,
                reclaimed = report.reclaimed,
                tracked = report.tracked,
                "collector scan"
            );
        }
        report
    }

    fn trace(&self, forest: &mut Forest<Tracked>) -> usize {
        let world = self.world.write();
        let first = trace::unreachable(forest, &self.modules);
        if first.is_empty() {
            return 0;
        }
        // An unpinned writer may have moved a reference between the count
        // and reference passes; only clear what a second pass agrees on.
        let second = trace::unreachable(forest, &self.modules);
        let garbage: HashSet<Id> = first.intersection(&second).copied().collect();
        if garbage.is_empty() {
            return 0;
        }
        let doomed = forest.retain(|tracked| !garbage.contains(&tracked.0.id()));
        let count = doomed.len();
        let cleared: Vec<_> = doomed
            .iter()
            .map(|tracked| tracked.0.clear_attributes())
            .collect();
        drop(world);
        drop(cleared);
        drop(doomed);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;
    use pretty_assertions::assert_eq;

    fn manual() -> GarbageCollector {
        GarbageCollector::start(GcConfig::manual(), Arc::new(ModuleTable::new()))
    }

    #[test]
    fn test_unheld_object_released_on_second_scan() {
        let gc = manual();
        gc.emplace(Object::bare(Value::Instance));
        assert_eq!(gc.scan().released, 0);
        let report = gc.scan();
        assert_eq!(report.released, 1);
        assert_eq!(report.tracked, 0);
    }

    #[test]
    fn test_held_object_survives() {
        let gc = manual();
        let held = Object::bare(Value::Instance);
        gc.emplace(held.clone());
        gc.scan();
        gc.collect();
        assert_eq!(gc.stats().tracked, 1);
        assert_eq!(held.use_count(), 2);
    }

    #[test]
    fn test_cycle_reclaimed_by_trace() {
        let gc = manual();
        let a = Object::bare(Value::Instance);
        let b = Object::bare(Value::Instance);
        a.set_attribute("peer", b.clone());
        b.set_attribute("peer", a.clone());
        gc.emplace(a.clone());
        gc.emplace(b.clone());
        drop((a, b));

        assert_eq!(gc.scan().released, 0);
        let report = gc.collect();
        assert_eq!(report.reclaimed, 2);
        assert_eq!(report.tracked, 0);
    }

    #[test]
    fn test_cycle_reachable_from_module_survives() {
        let modules = Arc::new(ModuleTable::new());
        let gc = GarbageCollector::start(GcConfig::manual(), Arc::clone(&modules));
        let module = Object::bare(Value::Instance);
        let a = Object::bare(Value::Instance);
        a.set_attribute("self", a.clone());
        module.set_attribute("a", a.clone());
        gc.emplace(module.clone());
        gc.emplace(a.clone());
        modules.insert("m", module);
        drop(a);

        let report = gc.collect();
        assert_eq!(report.reclaimed, 0);
        assert_eq!(report.tracked, 2);
    }

    #[test]
    fn test_background_thread_stops_on_shutdown() {
        let config = GcConfig {
            background: true,
            scan_interval: std::time::Duration::from_millis(1),
            trace_every: 2,
        };
        let gc = GarbageCollector::start(config, Arc::new(ModuleTable::new()));
        assert!(gc.is_running());
        gc.shutdown();
        assert!(!gc.is_running());
        gc.shutdown();
    }
}
