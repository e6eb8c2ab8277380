//! Process-wide call-site registry.
//!
//! Threads publish the call sites they are executing through RAII guards,
//! forming a shadow call stack per thread. [`CallSiteRegistry`] snapshots
//! every live thread's shadow stack and implements [`ThreadIntrospector`].
//!
//! Threads are held weakly: a thread that exits between two snapshots drops
//! out of the registry on its own, and one exiting during a snapshot yields
//! at most a stale stack.
//!
//! Guards are `!Send`. Do not hold a [`FrameGuard`] across an `.await` on a
//! multi-threaded runtime; mark synchronous sections instead.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use super::frame::StackFrame;
use super::introspect::{ThreadIntrospector, ThreadSnapshot};

#[derive(Debug)]
struct ThreadSlot {
    name: Option<String>,
    /// Outermost frame first (push order).
    frames: Mutex<Vec<StackFrame>>,
    /// Nesting depth of active monitor scopes.
    monitor_depth: AtomicUsize,
}

impl ThreadSlot {
    fn snapshot(&self) -> ThreadSnapshot {
        let frames = lock(&self.frames).iter().rev().cloned().collect();
        ThreadSnapshot {
            thread_name: self.name.clone(),
            frames,
            monitor: self.monitor_depth.load(Ordering::Acquire) > 0,
        }
    }
}

#[derive(Debug, Default)]
struct Threads {
    slots: Mutex<Vec<Weak<ThreadSlot>>>,
}

fn threads() -> &'static Threads {
    static THREADS: OnceLock<Threads> = OnceLock::new();
    THREADS.get_or_init(Threads::default)
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadSlot>>> = const { RefCell::new(None) };
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` with the current thread's slot, registering it on first use.
///
/// Returns `None` while the thread-local is being torn down.
fn with_current<R>(f: impl FnOnce(&ThreadSlot) -> R) -> Option<R> {
    CURRENT
        .try_with(|current| {
            let mut current = current.borrow_mut();
            let slot = current.get_or_insert_with(|| {
                let slot = Arc::new(ThreadSlot {
                    name: std::thread::current().name().map(str::to_owned),
                    frames: Mutex::new(Vec::new()),
                    monitor_depth: AtomicUsize::new(0),
                });
                lock(&threads().slots).push(Arc::downgrade(&slot));
                slot
            });
            f(slot)
        })
        .ok()
}

/// Marks a call site on the current thread until dropped.
#[derive(Debug)]
#[must_use = "the call site is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let depth = self.depth;
        with_current(|slot| lock(&slot.frames).truncate(depth));
    }
}

/// Push a call site onto the current thread's shadow stack.
pub fn enter(
    declaring_unit: impl Into<String>,
    entry_point: impl Into<String>,
    source_line: u32,
) -> FrameGuard {
    let frame = StackFrame::new(declaring_unit, entry_point, source_line);
    let depth = with_current(|slot| {
        let mut frames = lock(&slot.frames);
        let depth = frames.len();
        frames.push(frame);
        depth
    })
    .unwrap_or(0);

    FrameGuard {
        depth,
        _not_send: PhantomData,
    }
}

/// Marks the current thread as executing the monitor itself until dropped.
#[derive(Debug)]
#[must_use = "the monitor flag is cleared as soon as the guard is dropped"]
pub struct MonitorGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        with_current(|slot| slot.monitor_depth.fetch_sub(1, Ordering::AcqRel));
    }
}

/// Flag the current thread as the monitor's own execution path.
///
/// Snapshots taken while the guard is alive report the thread with
/// `monitor: true`, and the attributor skips it.
pub fn monitor_scope() -> MonitorGuard {
    with_current(|slot| slot.monitor_depth.fetch_add(1, Ordering::AcqRel));
    MonitorGuard {
        _not_send: PhantomData,
    }
}

/// Introspector over every thread that has published a call site.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallSiteRegistry;

impl CallSiteRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl ThreadIntrospector for CallSiteRegistry {
    fn snapshot(&self) -> Vec<ThreadSnapshot> {
        let live: Vec<Arc<ThreadSlot>> = {
            let mut slots = lock(&threads().slots);
            slots.retain(|slot| slot.strong_count() > 0);
            slots.iter().filter_map(Weak::upgrade).collect()
        };

        live.iter()
            .map(|slot| slot.snapshot())
            .filter(|snapshot| !snapshot.frames.is_empty() || snapshot.monitor)
            .collect()
    }
}

/// Mark the enclosing call site for attribution.
///
/// Expands to [`enter`] with the caller's module path and line:
///
/// ```rust
/// fn upload() {
///     let _site = netmonitor::callsite!("upload");
///     // network calls made here are attributed to `<module>.upload`
/// }
/// # upload();
/// ```
#[macro_export]
macro_rules! callsite {
    ($entry_point:expr) => {
        $crate::attribution::enter(module_path!(), $entry_point, line!())
    };
}
