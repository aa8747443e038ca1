pub mod configuration;
pub mod control;
pub mod destination;
pub mod event;

pub use configuration::Configuration;
pub use control::ControlParams;
pub use destination::{env_prefix, Destination};
pub use event::IncomingEvent;
