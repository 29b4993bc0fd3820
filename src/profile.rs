//! Opt-in process-wide timing counters for traversal execution.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of traversal profiling metrics.
///
/// Profiling is enabled via the `SOMBRA_PROFILE` environment variable and
/// tracks time spent in each phase of traversal execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraversalProfileSnapshot {
    /// Total nanoseconds spent applying strategies.
    pub strategy_ns: u64,
    /// Number of strategy application passes.
    pub strategy_count: u64,
    /// Total nanoseconds spent pulling traversers from step chains.
    pub pull_ns: u64,
    /// Number of pulls made by callers.
    pub pull_count: u64,
    /// Total nanoseconds spent waiting on remote or bulk-parallel engines.
    pub dispatch_ns: u64,
    /// Number of dispatch submissions.
    pub dispatch_count: u64,
    /// Total nanoseconds spent in bulk I/O transfers.
    pub io_ns: u64,
    /// Number of bulk I/O transfers.
    pub io_count: u64,
}

#[derive(Default)]
struct TraversalProfileCounters {
    strategy_ns: AtomicU64,
    strategy_count: AtomicU64,
    pull_ns: AtomicU64,
    pull_count: AtomicU64,
    dispatch_ns: AtomicU64,
    dispatch_count: AtomicU64,
    io_ns: AtomicU64,
    io_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<TraversalProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("SOMBRA_PROFILE").is_some())
}

fn counters() -> Option<&'static TraversalProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(TraversalProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum TraversalProfileKind {
    Strategy,
    Pull,
    Dispatch,
    Io,
}

pub(crate) fn record_profile_timer(kind: TraversalProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    let (ns, count) = match kind {
        TraversalProfileKind::Strategy => (&counters.strategy_ns, &counters.strategy_count),
        TraversalProfileKind::Pull => (&counters.pull_ns, &counters.pull_count),
        TraversalProfileKind::Dispatch => (&counters.dispatch_ns, &counters.dispatch_count),
        TraversalProfileKind::Io => (&counters.io_ns, &counters.io_count),
    };
    ns.fetch_add(nanos, Ordering::Relaxed);
    count.fetch_add(1, Ordering::Relaxed);
}

/// Retrieves a snapshot of current traversal profiling metrics.
///
/// Returns `None` when profiling is disabled. When `reset` is true the counters
/// are zeroed as they are read.
pub fn profile_snapshot(reset: bool) -> Option<TraversalProfileSnapshot> {
    let counters = counters()?;
    let load = |counter: &AtomicU64| {
        if reset {
            counter.swap(0, Ordering::Relaxed)
        } else {
            counter.load(Ordering::Relaxed)
        }
    };
    Some(TraversalProfileSnapshot {
        strategy_ns: load(&counters.strategy_ns),
        strategy_count: load(&counters.strategy_count),
        pull_ns: load(&counters.pull_ns),
        pull_count: load(&counters.pull_count),
        dispatch_ns: load(&counters.dispatch_ns),
        dispatch_count: load(&counters.dispatch_count),
        io_ns: load(&counters.io_ns),
        io_count: load(&counters.io_count),
    })
}
