//! Metrics and observability for memc-load.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and the `/metrics` HTTP endpoint

pub mod events;
pub mod server;

pub use server::{LoadProgress, init};

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding metric and a trace line.
///
/// ```ignore
/// use memc_load::metrics::events::RecordsDelivered;
///
/// emit!(RecordsDelivered { count: 1 });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
