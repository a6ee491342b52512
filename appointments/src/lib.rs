//! # Meetpoint Appointments
//!
//! Appointment lifecycle and bidirectional rating reconciliation for a
//! peer-to-peer marketplace.
//!
//! A buyer requests an in-person exchange at a seller's meeting point. The
//! seller confirms (stock is reserved atomically with the transition) or
//! rejects; unanswered requests expire once their window passes. After a
//! confirmed exchange both parties rate each other, and the second rating
//! closes the appointment.
//!
//! ```text
//! Requested ──confirm──▶ Confirmed ──(both ratings)──▶ Completed
//!     │
//!     ├──reject──▶ Cancelled(rejected)
//!     └──expire──▶ Cancelled(expired)
//! ```
//!
//! ## Layout
//!
//! - [`lifecycle`]: the pure reducer holding every guard
//! - [`engine`]: the shell that loads, decides, persists and notifies
//! - [`sweeper`]: periodic expiry and closure reconciliation
//! - [`ports`]: storage and notification traits, with [`memory`] adapters
//!
//! ## Example
//!
//! ```ignore
//! let backend = InMemoryBackend::new();
//! let env = LifecycleEnvironment::new(Arc::new(SystemClock), Arc::new(TracingEmitter));
//! let engine = AppointmentEngine::new(backend.ports(), env);
//!
//! let appointment = engine.request(new_appointment).await?;
//! engine.confirm(appointment.id, seller_id).await?;
//! ```

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod notify;
pub mod ports;
pub mod sweeper;
pub mod types;

pub use engine::{AppointmentDetail, AppointmentEngine, EnginePorts, NewAppointment, NewRating, RatingReceipt};
pub use error::{EngineError, ErrorKind, NotificationError, StorageError};
pub use lifecycle::{LifecycleEnvironment, LifecycleSettings};
pub use memory::InMemoryBackend;
pub use notify::{TracingEmitter, WebhookEmitter};
pub use sweeper::{ExpirySweeper, SweepReport, SweeperConfig};
pub use types::*;
