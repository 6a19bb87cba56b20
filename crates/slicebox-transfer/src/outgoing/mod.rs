//! Outgoing transfer engine (spec.md §4.E): PUSH-mode worker loop and
//! POLL-mode HTTP-facing functions, sharing the send-side pipeline plumbing
//! in `pipeline`.

mod dto;
mod pipeline;
mod poll;
mod push;

pub use dto::OutgoingTransactionImage;
pub use poll::{bytes_for, mark_done, mark_failed, poll_next};
pub use push::OutgoingWorker;
