use async_trait::async_trait;
use std::io;
use std::time::Duration;

/// An open, line-oriented serial connection to the motor controller.
#[async_trait]
pub trait SerialLine: Send {
    /// Write `line` followed by a newline and flush.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;
    /// Wait up to `wait` for one response line. `Ok(None)` on timeout.
    async fn read_line(&mut self, wait: Duration) -> io::Result<Option<String>>;
    /// Drop any input received but not yet read.
    async fn discard_input(&mut self) -> io::Result<()>;
}

/// Opens serial devices by path. Implemented by the OS backend and by test doubles.
#[async_trait]
pub trait SerialInterface: Send + Sync {
    async fn open(&self, port: &str, baud: u32) -> io::Result<Box<dyn SerialLine>>;
    fn available_ports(&self) -> Vec<String>;
}
