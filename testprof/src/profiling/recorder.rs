//! Deterministic call recorder
//!
//! Each thread has at most one active [`Recorder`]. Instrumentation (the
//! tracing layer or [`scope`] guards) reports function entry and exit; the
//! recorder keeps a shadow call stack and accumulates:
//!
//! - total calls, and primitive calls (activations that were not already on
//!   the stack, i.e. not recursive)
//! - inline time: wall time minus time spent in callees
//! - cumulative time, counted only for the outermost activation so that
//!   recursion does not count the same interval twice
//! - the same statistics per caller -> callee edge

use crate::domain::ProfilingError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use testprof_common::{FunctionKey, ProfileData};

thread_local! {
    static ACTIVE: RefCell<Option<Recorder>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct Frame {
    key: FunctionKey,
    started: Instant,
    /// Time spent in callees of this activation
    subcall_time: Duration,
}

/// Shadow call stack plus accumulated statistics.
#[derive(Debug, Default)]
pub struct Recorder {
    stack: Vec<Frame>,
    /// How many activations of each function are on the stack
    active: HashMap<FunctionKey, usize>,
    /// How many activations of each (caller, callee) edge are on the stack
    active_edges: HashMap<(FunctionKey, FunctionKey), usize>,
    data: ProfileData,
}

impl Recorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_at(&mut self, key: FunctionKey, now: Instant) {
        if let Some(caller) = self.stack.last() {
            *self.active_edges.entry((caller.key.clone(), key.clone())).or_default() += 1;
        }
        *self.active.entry(key.clone()).or_default() += 1;
        self.stack.push(Frame { key, started: now, subcall_time: Duration::ZERO });
    }

    /// Close the innermost activation. Returns false when the stack is empty.
    pub fn exit_at(&mut self, now: Instant) -> bool {
        let Some(frame) = self.stack.pop() else {
            return false;
        };

        let elapsed = now.saturating_duration_since(frame.started);
        let inline = elapsed.saturating_sub(frame.subcall_time);
        let outermost = release(&mut self.active, &frame.key);

        let caller = self.stack.last_mut().map(|parent| {
            parent.subcall_time += elapsed;
            parent.key.clone()
        });

        let entry = self.data.entry_mut(frame.key.clone());
        entry.stats.total_calls += 1;
        entry.stats.inline_time += inline.as_secs_f64();
        if outermost {
            entry.stats.primitive_calls += 1;
            entry.stats.cumulative_time += elapsed.as_secs_f64();
        }

        if let Some(caller) = caller {
            let edge_key = (caller, frame.key);
            let edge_outermost = release(&mut self.active_edges, &edge_key);
            let edge = entry.callers.entry(edge_key.0).or_default();
            edge.total_calls += 1;
            edge.inline_time += inline.as_secs_f64();
            if edge_outermost {
                edge.primitive_calls += 1;
                edge.cumulative_time += elapsed.as_secs_f64();
            }
        }
        true
    }

    /// Key of the innermost activation.
    #[must_use]
    pub fn current(&self) -> Option<&FunctionKey> {
        self.stack.last().map(|f| &f.key)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Close every open activation as of `now`.
    pub fn flush_at(&mut self, now: Instant) {
        while self.exit_at(now) {}
    }

    #[must_use]
    pub fn into_data(mut self) -> ProfileData {
        self.flush_at(Instant::now());
        self.data
    }
}

/// Decrement an activation counter; true when it reached zero.
fn release<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, usize>, key: &K) -> bool {
    match counts.get_mut(key) {
        Some(count) if *count > 1 => {
            *count -= 1;
            false
        }
        Some(_) => {
            counts.remove(key);
            true
        }
        None => true,
    }
}

// ============================================================================
// Thread-local capture
// ============================================================================

/// Handle on the calling thread's active recorder.
///
/// Capture stops when the handle is disabled or dropped. Not `Send`: the
/// recorder lives in thread-local storage.
#[derive(Debug)]
pub struct Profiler {
    finished: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl Profiler {
    /// Start capturing on the current thread.
    ///
    /// # Errors
    /// Returns [`ProfilingError::AlreadyRecording`] if this thread already
    /// has an active profiler.
    pub fn enable() -> Result<Self, ProfilingError> {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(ProfilingError::AlreadyRecording);
            }
            *slot = Some(Recorder::new());
            Ok(Self { finished: false, _thread_bound: PhantomData })
        })
    }

    /// Stop capturing and return what was recorded. Activations still open
    /// are closed as of now.
    #[must_use]
    pub fn disable(mut self) -> ProfileData {
        self.finished = true;
        take_recorder().map(Recorder::into_data).unwrap_or_default()
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        if !self.finished {
            drop(take_recorder());
        }
    }
}

fn take_recorder() -> Option<Recorder> {
    ACTIVE.try_with(|slot| slot.borrow_mut().take()).ok().flatten()
}

fn with_recorder(f: impl FnOnce(&mut Recorder)) {
    // Ignored during thread teardown
    let _ = ACTIVE.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if let Some(recorder) = slot.as_mut() {
                f(recorder);
            }
        }
    });
}

/// True when the current thread has an active profiler.
#[must_use]
pub fn is_recording() -> bool {
    ACTIVE.try_with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(false)).unwrap_or(false)
}

/// Report entry into `key` on the current thread.
pub fn enter(key: FunctionKey) {
    let now = Instant::now();
    with_recorder(|recorder| recorder.enter_at(key, now));
}

/// Report exit from `key`. Ignored unless `key` is the innermost activation.
pub fn exit(key: &FunctionKey) {
    let now = Instant::now();
    with_recorder(|recorder| {
        if recorder.current() == Some(key) {
            recorder.exit_at(now);
        }
    });
}

/// Guard that records one activation of a function until dropped.
#[derive(Debug)]
#[must_use = "the activation ends when the guard is dropped"]
pub struct ScopeGuard {
    key: FunctionKey,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        exit(&self.key);
    }
}

/// Record an activation of `key` for the lifetime of the returned guard.
///
/// ```
/// use testprof::profiling::{scope, Profiler};
/// use testprof_common::FunctionKey;
///
/// let profiler = Profiler::enable().unwrap();
/// {
///     let _guard = scope(FunctionKey::new("src/lib.rs", 10, "parse"));
/// }
/// let data = profiler.disable();
/// assert_eq!(data.total_calls(), 1);
/// ```
pub fn scope(key: FunctionKey) -> ScopeGuard {
    enter(key.clone());
    ScopeGuard { key }
}
