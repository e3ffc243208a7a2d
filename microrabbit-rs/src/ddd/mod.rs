//! DDD: handler contracts and the command mediator.

pub mod command_handler;
pub mod mediator;

pub use command_handler::{CommandHandler, EventHandler};
pub use mediator::{InProcessMediator, Mediator};
