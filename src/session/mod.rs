//! Session management module.
//!
//! Sessions pair a reusable transport (or a local-execution marker) with a
//! derived key, an idle-eviction timer, and an accumulated environment
//! overlay.

mod handle;
mod key;
mod pool;

pub use handle::{HandleState, SessionHandle};
pub use key::SessionKey;
pub use pool::SessionPool;
