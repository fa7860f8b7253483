pub mod sync;

pub use sync::{sync_progress, trigger_sync};
