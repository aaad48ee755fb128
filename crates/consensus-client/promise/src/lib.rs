//! Single-assignment promise used for every call across the execution/consensus boundary.
//!
//! A [`Promise`] settles at most once, either resolved with a value or rejected with an
//! error. Clones share state, so callers coalesced onto one request observe the same
//! outcome, and [`Promise::same_as`] tells whether two handles are the same request.

mod errors;
mod promise;

pub use errors::{AlreadySettled, WaitError};
pub use promise::Promise;
