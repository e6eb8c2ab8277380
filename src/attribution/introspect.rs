//! Thread introspection seam.

use super::frame::StackFrame;

/// Call stack of one live thread at the instant of the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThreadSnapshot {
    pub thread_name: Option<String>,
    /// Frames ordered innermost (most recent call) first.
    pub frames: Vec<StackFrame>,
    /// Set when the thread is running the monitor's own sampling path.
    pub monitor: bool,
}

impl ThreadSnapshot {
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self {
            thread_name: None,
            frames,
            monitor: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Mark the snapshot as belonging to the monitor itself.
    pub fn as_monitor(mut self) -> Self {
        self.monitor = true;
        self
    }
}

/// Observes all live threads and their call stacks.
///
/// Implementations must tolerate threads starting and exiting while the
/// snapshot is taken; a vanished thread is simply absent or stale.
pub trait ThreadIntrospector: Send + Sync + 'static {
    fn snapshot(&self) -> Vec<ThreadSnapshot>;
}

impl<T: ThreadIntrospector + ?Sized> ThreadIntrospector for std::sync::Arc<T> {
    fn snapshot(&self) -> Vec<ThreadSnapshot> {
        (**self).snapshot()
    }
}
