// hexapod-rs: operator side of the hexapod bridge
pub mod channel;
pub mod console;

pub use channel::{CommandClient, ResponsePoller};
pub use console::{OperatorError, parse_assignment, parse_console_line};
