use async_trait::async_trait;
use hexapod_shared::serial_interface::{SerialInterface, SerialLine};
use serial2_tokio::SerialPort;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, timeout, timeout_at};

/// OS serial backend using serial2-tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

struct SystemLine {
    port: SerialPort,
    pending: Vec<u8>,
}

#[async_trait]
impl SerialInterface for SystemSerial {
    async fn open(&self, port: &str, baud: u32) -> io::Result<Box<dyn SerialLine>> {
        let serial = SerialPort::open(port, baud)?;
        Ok(Box::new(SystemLine {
            port: serial,
            pending: Vec::new(),
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        match SerialPort::available_ports() {
            Ok(paths) => paths.iter().map(|p| p.display().to_string()).collect(),
            Err(_) => vec![],
        }
    }
}

#[async_trait]
impl SerialLine for SystemLine {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');
        let mut written = 0;
        while written < framed.len() {
            let n = self.port.write(&framed[written..]).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "serial port accepted no bytes"));
            }
            written += n;
        }
        AsyncWriteExt::flush(&mut self.port).await
    }

    async fn read_line(&mut self, wait: Duration) -> io::Result<Option<String>> {
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 256];
        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }
            match timeout_at(deadline, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port closed"));
                }
                Ok(Ok(n)) => self.pending.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(None),
            }
        }
    }

    async fn discard_input(&mut self) -> io::Result<()> {
        let mut dropped = self.pending.len();
        self.pending.clear();
        let mut buf = [0u8; 256];
        // A zero timeout still polls the read once: take only what is buffered.
        loop {
            match timeout(Duration::ZERO, self.port.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port closed"));
                }
                Ok(Ok(n)) => dropped += n,
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }
        if dropped > 0 {
            tracing::debug!("Discarded {} bytes of stale MCU output", dropped);
        }
        Ok(())
    }
}
