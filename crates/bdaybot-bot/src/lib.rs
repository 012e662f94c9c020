//! # bdaybot bot
//! Chat-facing behaviour: commands, inline buttons, pending replies and the
//! loop that feeds channel events through the handler.

pub mod command;
pub mod dispatch;
pub mod handler;
pub mod keyboard;
pub mod session;

pub use dispatch::Dispatcher;
pub use handler::{Directive, Handler};
pub use session::{PendingAction, SessionStore};
