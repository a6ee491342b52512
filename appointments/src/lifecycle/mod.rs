//! The appointment lifecycle as a pure reducer.
//!
//! The reducer validates every guard of the state machine against a loaded
//! [`LifecycleState`] and the injected clock, applies the resulting events,
//! queues them in `pending` for the engine to persist, and describes the
//! notifications to send once persistence succeeded. It performs no I/O.

mod actions;
mod environment;
mod reducer;
mod state;

pub use actions::AppointmentAction;
pub use environment::{LifecycleEnvironment, LifecycleSettings};
pub use reducer::LifecycleReducer;
pub use state::{LifecycleState, RequestContext};
