//! # chorus
//!
//! A single-threaded cooperative coroutine runtime built around typed
//! channels and multi-way selection.
//!
//! Coroutines of one [`Executor`] communicate over
//! [`LocalChannel`](sync::LocalChannel)s: typed FIFO conduits with optional
//! bounded buffering, rendezvous handoff, deadlines and a terminal *done*
//! state. A [`Selector`](sync::Selector) commits to exactly one of several
//! pending send/receive clauses across channels.
//!
//! Because exactly one coroutine runs at a time and suspension points are
//! explicit, no channel operation takes a lock.
//!
//! # Example
//!
//! ```rust
//! use chorus::sync::{local_scope, LocalChannel};
//! use chorus::Executor;
//!
//! fn main() {
//!     Executor::init();
//!     chorus::local_executor()
//!         .run_and_block_on(async {
//!             let ch = LocalChannel::bounded(1);
//!             let ch_ref = &ch;
//!
//!             local_scope(|scope| async move {
//!                 scope.spawn(async move {
//!                     ch_ref.send(42).await.unwrap();
//!                 });
//!
//!                 assert_eq!(ch_ref.recv().await.unwrap(), 42);
//!             })
//!             .await;
//!         })
//!         .unwrap();
//! }
//! ```

pub(crate) mod bug_message;
pub mod local;
pub mod runtime;
pub mod sleep;
pub mod sync;
pub mod test;
pub mod utils;
pub mod yield_now;

pub(crate) use bug_message::BUG_MESSAGE;
pub use local::Local;
pub use runtime::{local_executor, BadHandle, Config, Executor, Handle};
pub use sleep::sleep;
pub use yield_now::yield_now;
