//! Call-Site Attribution
//!
//! Associates measured network usage with the code that was running when it
//! was measured, by inspecting the call stacks of all live threads.
//!
//! # Architecture
//!
//! - [`ThreadIntrospector`]: Snapshot seam over live threads and their stacks
//! - [`CallSiteRegistry`]: In-process introspector fed by [`enter`] / [`callsite!`](crate::callsite)
//! - [`CallSiteAttributor`]: Selects the innermost tracked frame per thread

mod attributor;
mod callsite;
mod frame;
mod introspect;

pub use attributor::{
    CallSiteAttributor, SAMPLING_DECLARING_UNIT, SAMPLING_ENTRY_POINT, select_frame,
};
pub use callsite::{CallSiteRegistry, FrameGuard, MonitorGuard, enter, monitor_scope};
pub use frame::{AttributionRecord, StackFrame, render_stack};
pub use introspect::{ThreadIntrospector, ThreadSnapshot};
