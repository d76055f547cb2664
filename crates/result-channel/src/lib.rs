//! Latest-Value Result Channel
//!
//! Single-slot mailbox between a producer that must never block and
//! consumers that only care about the most recent value.

mod channel;

pub use channel::{ResultChannel, Subscription};
