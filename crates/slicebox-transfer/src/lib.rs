//! Box transfer engine (spec.md §1): outgoing transfer engine (§4.E),
//! incoming transfer engine (§4.F), supervisor/scheduler (§4.G), and the
//! domain event bus (§4.H).

pub mod events;
pub mod incoming;
pub mod metadata;
pub mod outgoing;
pub mod supervisor;

pub use events::{DomainEvent, EventBus};
pub use incoming::handle_incoming;
pub use metadata::MetadataSink;
pub use supervisor::Supervisor;
