//! Call-site attribution over live thread stacks.

use std::sync::Arc;

use super::callsite::{enter, monitor_scope};
use super::frame::{AttributionRecord, StackFrame};
use super::introspect::{ThreadIntrospector, ThreadSnapshot};

/// Entry point name of the attributor's own sampling call.
pub const SAMPLING_ENTRY_POINT: &str = "attribute";

/// Declaring unit of the attributor's own sampling frame.
pub const SAMPLING_DECLARING_UNIT: &str = concat!(module_path!(), "::CallSiteAttributor");

/// Maps each live thread to the innermost frame of a tracked package.
#[derive(Clone)]
pub struct CallSiteAttributor {
    introspector: Arc<dyn ThreadIntrospector>,
    tracked_prefixes: Arc<[String]>,
}

impl std::fmt::Debug for CallSiteAttributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSiteAttributor")
            .field("tracked_prefixes", &self.tracked_prefixes)
            .finish_non_exhaustive()
    }
}

impl CallSiteAttributor {
    /// Create an attributor for the given tracked package prefixes.
    pub fn new(
        introspector: impl ThreadIntrospector,
        tracked_prefixes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            introspector: Arc::new(introspector),
            tracked_prefixes: tracked_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Tracked package prefixes in configuration order.
    pub fn tracked_prefixes(&self) -> &[String] {
        &self.tracked_prefixes
    }

    /// Produce one record per live thread running tracked code.
    ///
    /// The calling thread is flagged as the monitor and carries the sampling
    /// frame for the duration of the snapshot, so its own stack never
    /// contributes.
    pub fn attribute(&self) -> Vec<AttributionRecord> {
        let snapshots = {
            let _monitor = monitor_scope();
            let _sampling = enter(SAMPLING_DECLARING_UNIT, SAMPLING_ENTRY_POINT, line!());
            self.introspector.snapshot()
        };

        let records: Vec<_> = snapshots
            .iter()
            .filter_map(|snapshot| self.attribute_thread(snapshot))
            .collect();

        tracing::trace!(
            threads = snapshots.len(),
            records = records.len(),
            "Attribution complete"
        );
        records
    }

    /// Attribute a single thread, or `None` if it has no tracked frame.
    pub fn attribute_thread(&self, snapshot: &ThreadSnapshot) -> Option<AttributionRecord> {
        if snapshot.monitor {
            return None;
        }

        let selected = select_frame(&snapshot.frames, &self.tracked_prefixes)?;
        if selected.entry_point == SAMPLING_ENTRY_POINT {
            tracing::trace!(
                thread = snapshot.thread_name.as_deref().unwrap_or("<unnamed>"),
                "Skipping thread inside a sampling call"
            );
            return None;
        }

        Some(AttributionRecord::new(selected, &snapshot.frames))
    }
}

/// First tracked frame scanning from the innermost frame outward.
///
/// Prefix order is irrelevant: stack depth alone decides.
pub fn select_frame<'a, S: AsRef<str>>(
    frames: &'a [StackFrame],
    prefixes: &[S],
) -> Option<&'a StackFrame> {
    frames.iter().find(|frame| frame.matches_any(prefixes))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedThreads(Vec<ThreadSnapshot>);

    impl ThreadIntrospector for FixedThreads {
        fn snapshot(&self) -> Vec<ThreadSnapshot> {
            self.0.clone()
        }
    }

    fn frame(unit: &str, entry: &str, line: u32) -> StackFrame {
        StackFrame::new(unit, entry, line)
    }

    #[test]
    fn test_first_innermost_match_wins() {
        let stack = vec![
            frame("A", "foo", 1),
            frame("B", "bar", 2),
            frame("TrackedPkg", "baz", 3),
            frame("C", "qux", 4),
            frame("TrackedPkg.Deep", "main", 5),
        ];
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![ThreadSnapshot::new(stack)]),
            ["TrackedPkg"],
        );

        let records = attributor.attribute();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declaring_unit, "TrackedPkg");
        assert_eq!(records[0].entry_point, "baz");
        assert_eq!(records[0].source_line, 3);
    }

    #[test]
    fn test_prefix_order_irrelevant() {
        let stack = vec![
            frame("com.app.io.Disk", "flush", 10),
            frame("com.app.net.Http", "send", 20),
        ];
        let forward = CallSiteAttributor::new(
            FixedThreads(vec![ThreadSnapshot::new(stack.clone())]),
            ["com.app.net", "com.app.io"],
        );
        let reverse = CallSiteAttributor::new(
            FixedThreads(vec![ThreadSnapshot::new(stack)]),
            ["com.app.io", "com.app.net"],
        );

        assert_eq!(forward.attribute()[0].entry_point, "flush");
        assert_eq!(reverse.attribute()[0].entry_point, "flush");
    }

    #[test]
    fn test_unmatched_threads_contribute_nothing() {
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![
                ThreadSnapshot::new(vec![frame("org.lib.Pool", "run", 1)]),
                ThreadSnapshot::new(vec![]),
                ThreadSnapshot::new(vec![frame("com.app.Sync", "push", 8)]),
            ]),
            ["com.app"],
        );

        let records = attributor.attribute();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry_point, "push");
    }

    #[test]
    fn test_monitor_thread_excluded() {
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![
                ThreadSnapshot::new(vec![frame("com.app.Poller", "poll", 1)]).as_monitor(),
            ]),
            ["com.app"],
        );
        assert!(attributor.attribute().is_empty());
    }

    #[test]
    fn test_sampling_entry_point_excluded() {
        let own = frame(SAMPLING_DECLARING_UNIT, SAMPLING_ENTRY_POINT, 60);
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![
                ThreadSnapshot::new(vec![own, frame("netmonitor::scheduler", "run", 1)]),
                ThreadSnapshot::new(vec![frame("com.app.Monitor", "attribute", 3)])
                    .with_name("app-monitor"),
                ThreadSnapshot::new(vec![frame("com.app.Feed", "load", 7)]),
            ]),
            ["netmonitor", "com.app"],
        );

        let records = attributor.attribute();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry_point, "load");
        assert!(
            records
                .iter()
                .all(|r| r.entry_point != SAMPLING_ENTRY_POINT)
        );
    }

    #[test]
    fn test_sampling_frame_only_considered_when_selected() {
        // A sampling-named frame deeper than the selected one does not exclude the thread.
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![ThreadSnapshot::new(vec![
                frame("com.app.Upload", "send", 12),
                frame("com.app.Monitor", "attribute", 3),
            ])]),
            ["com.app"],
        );

        let records = attributor.attribute();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry_point, "send");
    }

    #[test]
    fn test_record_carries_full_stack() {
        let stack = vec![
            frame("okio.Buffer", "write", 12),
            frame("com.app.Upload", "send", 40),
            frame("java.lang.Thread", "run", 1),
        ];
        let attributor = CallSiteAttributor::new(
            FixedThreads(vec![ThreadSnapshot::new(stack)]),
            ["com.app"],
        );

        let record = &attributor.attribute()[0];
        assert_eq!(
            record.call_stack_text,
            "okio.Buffer.write:12\ncom.app.Upload.send:40\njava.lang.Thread.run:1"
        );
    }

    #[test]
    fn test_one_record_per_thread() {
        let threads = (0..4)
            .map(|i| ThreadSnapshot::new(vec![frame("com.app.Worker", "work", i)]))
            .collect();
        let attributor = CallSiteAttributor::new(FixedThreads(threads), ["com.app"]);
        assert_eq!(attributor.attribute().len(), 4);
    }

    #[test]
    fn test_attributing_thread_never_reported() {
        use crate::attribution::CallSiteRegistry;

        let _site = enter("test.attributor.Self", "loop_body", 9);
        let attributor = CallSiteAttributor::new(CallSiteRegistry::new(), ["test.attributor"]);
        assert!(attributor.attribute().is_empty());
    }

    fn own_stack() -> Option<ThreadSnapshot> {
        use crate::attribution::CallSiteRegistry;

        let name = std::thread::current().name().map(str::to_owned);
        CallSiteRegistry::new()
            .snapshot()
            .into_iter()
            .find(|s| s.thread_name.is_some() && s.thread_name == name)
    }

    /// Hands the attributing thread's own stack back, minus the monitor flag.
    #[derive(Clone, Default)]
    struct OwnStack {
        seen: Arc<std::sync::Mutex<Vec<StackFrame>>>,
    }

    impl ThreadIntrospector for OwnStack {
        fn snapshot(&self) -> Vec<ThreadSnapshot> {
            let Some(mut own) = own_stack() else {
                return Vec::new();
            };
            *self.seen.lock().unwrap() = own.frames.clone();
            own.monitor = false;
            vec![own]
        }
    }

    #[test]
    fn test_attribute_pushes_sampling_frame() {
        let own = OwnStack::default();
        let attributor = CallSiteAttributor::new(own.clone(), ["netmonitor"]);
        assert!(attributor.attribute().is_empty());

        let seen = own.seen.lock().unwrap().clone();
        assert_eq!(seen[0].declaring_unit, SAMPLING_DECLARING_UNIT);
        assert_eq!(seen[0].entry_point, SAMPLING_ENTRY_POINT);

        // Popped once attribution returns.
        let after = own_stack().map(|s| s.frames).unwrap_or_default();
        assert!(after.iter().all(|f| f.entry_point != SAMPLING_ENTRY_POINT));
    }
}
