//! Test doubles for the serial layer.
//!
//! [`RecordingSerial`] stands in for the OS serial backend: it "opens" only
//! the device paths it was told exist, records every line written to them,
//! and can be told to fail writes or to reply with canned lines. A queued
//! reply becomes readable once the next line has been written.

use crate::hardware::LinkSettings;
use async_trait::async_trait;
use hexapod_shared::serial_interface::{SerialInterface, SerialLine};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorder {
    ports: Vec<String>,
    opened: Vec<String>,
    writes: Vec<String>,
    replies: VecDeque<String>,
    input: VecDeque<String>,
    reads: usize,
    discards: usize,
    failing_writes: usize,
    disconnect_after: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSerial {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingSerial {
    pub fn with_ports(ports: &[&str]) -> Self {
        let serial = Self::default();
        serial.lock().ports = ports.iter().map(|p| p.to_string()).collect();
        serial
    }

    fn lock(&self) -> MutexGuard<'_, Recorder> {
        // A panic in another test thread must not hide this test's records.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lines written so far, in order, across every opened port.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    /// Paths successfully opened, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    /// Let `writes` more lines through, then drop every port as if the
    /// controller had been unplugged.
    pub fn disconnect_after(&self, writes: usize) {
        self.lock().disconnect_after = Some(writes);
    }

    /// Acknowledgement reads attempted so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Times unread controller output was discarded.
    pub fn discards(&self) -> usize {
        self.lock().discards
    }

    pub fn queue_reply(&self, line: &str) {
        self.lock().replies.push_back(line.to_string());
    }

    pub fn unplug(&self, port: &str) {
        self.lock().ports.retain(|p| p != port);
    }

    pub fn plug(&self, port: &str) {
        self.lock().ports.push(port.to_string());
    }
}

struct RecordingLine {
    inner: RecordingSerial,
}

#[async_trait]
impl SerialInterface for RecordingSerial {
    async fn open(&self, port: &str, _baud: u32) -> io::Result<Box<dyn SerialLine>> {
        let mut recorder = self.lock();
        if !recorder.ports.iter().any(|p| p == port) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not present", port)));
        }
        recorder.opened.push(port.to_string());
        Ok(Box::new(RecordingLine {
            inner: self.clone(),
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        self.lock().ports.clone()
    }
}

#[async_trait]
impl SerialLine for RecordingLine {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut recorder = self.inner.lock();
        if recorder.failing_writes > 0 {
            recorder.failing_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
        }
        match recorder.disconnect_after {
            Some(0) => {
                recorder.ports.clear();
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            Some(remaining) => recorder.disconnect_after = Some(remaining - 1),
            None => {}
        }
        recorder.writes.push(line.to_string());
        if let Some(reply) = recorder.replies.pop_front() {
            recorder.input.push_back(reply);
        }
        Ok(())
    }

    async fn read_line(&mut self, _wait: Duration) -> io::Result<Option<String>> {
        let mut recorder = self.inner.lock();
        recorder.reads += 1;
        Ok(recorder.input.pop_front())
    }

    async fn discard_input(&mut self) -> io::Result<()> {
        let mut recorder = self.inner.lock();
        recorder.discards += 1;
        recorder.input.clear();
        Ok(())
    }
}

/// Link settings for tests: no boot pause, short ack wait.
pub fn link_settings(candidates: &[&str]) -> LinkSettings {
    LinkSettings {
        candidates: candidates.iter().map(|c| c.to_string()).collect(),
        baud: 115200,
        read_timeout: Duration::from_millis(10),
        settle: Duration::ZERO,
        scan_available: false,
    }
}
