pub mod logging;
pub mod propagation;

pub use logging::init_tracing;
pub use propagation::{TRACEPARENT_HEADER, TRACESTATE_HEADER, inject_trace_context};
