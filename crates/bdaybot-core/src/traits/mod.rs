//! Seams between the core logic and its I/O collaborators.

pub mod channel;
pub mod store;

pub use channel::Channel;
pub use store::BirthdayStore;
