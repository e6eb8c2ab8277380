//! Stack frames and attribution records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One frame of a thread's call stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Fully-qualified module or type name.
    pub declaring_unit: String,
    /// Function or method name.
    pub entry_point: String,
    pub source_line: u32,
}

impl StackFrame {
    pub fn new(
        declaring_unit: impl Into<String>,
        entry_point: impl Into<String>,
        source_line: u32,
    ) -> Self {
        Self {
            declaring_unit: declaring_unit.into(),
            entry_point: entry_point.into(),
            source_line,
        }
    }

    /// Whether this frame belongs to any of the tracked prefixes.
    pub fn matches_any<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes
            .iter()
            .any(|prefix| self.declaring_unit.starts_with(prefix.as_ref()))
    }

    /// `declaringUnit.entryPoint`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_unit, self.entry_point)
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}:{}",
            self.declaring_unit, self.entry_point, self.source_line
        )
    }
}

/// Render a stack as newline-joined frames, keeping the given order.
pub fn render_stack(frames: &[StackFrame]) -> String {
    frames
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The call site a thread's network usage is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributionRecord {
    pub declaring_unit: String,
    pub entry_point: String,
    pub source_line: u32,
    /// Whole stack of the thread, one frame per line.
    pub call_stack_text: String,
}

impl AttributionRecord {
    /// Build a record for `selected`, serializing the full `stack`.
    pub fn new(selected: &StackFrame, stack: &[StackFrame]) -> Self {
        Self {
            declaring_unit: selected.declaring_unit.clone(),
            entry_point: selected.entry_point.clone(),
            source_line: selected.source_line,
            call_stack_text: render_stack(stack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        let frame = StackFrame::new("com.app.net.Client", "fetch", 42);
        assert_eq!(frame.to_string(), "com.app.net.Client.fetch:42");
        assert_eq!(frame.qualified_name(), "com.app.net.Client.fetch");
    }

    #[test]
    fn test_frame_matches_any() {
        let frame = StackFrame::new("com.app.io.Disk", "write", 1);
        assert!(frame.matches_any(&["org.other", "com.app"]));
        assert!(!frame.matches_any(&["com.application"]));
        assert!(!frame.matches_any::<&str>(&[]));
    }

    #[test]
    fn test_render_stack_keeps_order() {
        let stack = vec![
            StackFrame::new("a.A", "inner", 3),
            StackFrame::new("b.B", "outer", 9),
        ];
        assert_eq!(render_stack(&stack), "a.A.inner:3\nb.B.outer:9");
        assert_eq!(render_stack(&[]), "");
    }
}
