// src/hardware/mod.rs - Serial link to the motor controller
pub mod serial_linux;

use hexapod_shared::protocol::LinkHealth;
use hexapod_shared::serial_interface::{SerialInterface, SerialLine};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no serial transport available (tried: {})", tried.join(", "))]
    NoTransportAvailable { tried: Vec<String> },
    #[error("serial link down: {0}")]
    LinkDown(String),
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Device paths in priority order.
    pub candidates: Vec<String>,
    pub baud: u32,
    /// Bound on waiting for an acknowledgement line.
    pub read_timeout: Duration,
    /// Pause after opening a port while the controller boots.
    pub settle: Duration,
    pub scan_available: bool,
}

/// Statistics for serial traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub lines_sent: u64,
    pub lines_deduplicated: u64,
    pub reconnects: u64,
    pub errors: u64,
}

/// Owns the serial connection to the motor controller.
///
/// - Identical consecutive lines are written once; the repeat reports success
///   without touching the wire.
/// - An I/O error marks the link disconnected. A send reconnects at most once
///   through discovery and retries the write once before giving up with
///   `LinkDown`.
/// - Not shared: one task owns the link and awaits each send to completion.
pub struct BoardLink {
    interface: Arc<dyn SerialInterface>,
    settings: LinkSettings,
    port: Option<Box<dyn SerialLine>>,
    port_name: Option<String>,
    last_sent: Option<String>,
    stats: LinkStats,
}

impl BoardLink {
    /// Open the first candidate device that accepts a connection.
    ///
    /// Fails with [`LinkError::NoTransportAvailable`] when none does. There is
    /// no internal retry; the caller decides whether to try again.
    pub async fn discover(
        interface: Arc<dyn SerialInterface>,
        settings: LinkSettings,
    ) -> Result<Self, LinkError> {
        let mut link = Self {
            interface,
            settings,
            port: None,
            port_name: None,
            last_sent: None,
            stats: LinkStats::default(),
        };
        link.connect().await?;
        Ok(link)
    }

    fn candidates(&self) -> Vec<String> {
        let mut candidates = self.settings.candidates.clone();
        if self.settings.scan_available {
            for port in self.interface.available_ports() {
                if !candidates.contains(&port) {
                    candidates.push(port);
                }
            }
        }
        candidates
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        let candidates = self.candidates();
        for candidate in &candidates {
            match self.interface.open(candidate, self.settings.baud).await {
                Ok(port) => {
                    tracing::info!("Connected to MCU on {} at {} baud", candidate, self.settings.baud);
                    if !self.settings.settle.is_zero() {
                        tokio::time::sleep(self.settings.settle).await;
                    }
                    self.port = Some(port);
                    self.port_name = Some(candidate.clone());
                    self.last_sent = None;
                    return Ok(());
                }
                Err(e) => tracing::debug!("Serial candidate {} unavailable: {}", candidate, e),
            }
        }
        Err(LinkError::NoTransportAvailable { tried: candidates })
    }

    async fn reconnect(&mut self) -> Result<(), LinkError> {
        self.stats.reconnects += 1;
        tracing::warn!("Reconnecting to MCU");
        self.connect().await.map_err(|e| {
            self.stats.errors += 1;
            LinkError::LinkDown(format!("reconnect failed: {}", e))
        })
    }

    fn mark_down(&mut self, reason: &std::io::Error) {
        tracing::error!(
            "Serial link {} failed: {}",
            self.port_name.as_deref().unwrap_or("<none>"),
            reason
        );
        self.stats.errors += 1;
        self.port = None;
        self.last_sent = None;
    }

    async fn write(&mut self, line: &str) -> Result<(), std::io::Error> {
        match self.port.as_mut() {
            Some(port) => port.write_line(line).await,
            None => Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "no serial port")),
        }
    }

    /// Drop controller output nobody waited for, so an acknowledgement read
    /// answers the line about to be sent.
    async fn discard_input(&mut self) {
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.discard_input().await {
                tracing::warn!("Failed to discard stale MCU input: {}", e);
            }
        }
    }

    /// Send one command line. With `ack`, wait up to the configured read
    /// timeout for a single response line; `Ok(None)` means none arrived.
    pub async fn send(&mut self, line: &str, ack: bool) -> Result<Option<String>, LinkError> {
        if self.port.is_some() && self.last_sent.as_deref() == Some(line) {
            tracing::trace!("MCU <- {} (unchanged, skipped)", line);
            self.stats.lines_deduplicated += 1;
            return Ok(None);
        }
        // At most one reconnect per send.
        let mut reconnected = false;
        if self.port.is_none() {
            self.reconnect().await?;
            reconnected = true;
        }
        if ack {
            self.discard_input().await;
        }

        tracing::debug!("MCU <- {}", line);
        if let Err(e) = self.write(line).await {
            self.mark_down(&e);
            if reconnected {
                return Err(LinkError::LinkDown(e.to_string()));
            }
            self.reconnect().await?;
            if let Err(e) = self.write(line).await {
                self.mark_down(&e);
                return Err(LinkError::LinkDown(e.to_string()));
            }
        }
        self.stats.lines_sent += 1;
        self.last_sent = Some(line.to_string());

        if !ack {
            return Ok(None);
        }
        let wait = self.settings.read_timeout;
        let result = match self.port.as_mut() {
            Some(port) => port.read_line(wait).await,
            None => Ok(None),
        };
        match result {
            Ok(Some(response)) => {
                tracing::debug!("MCU -> {}", response);
                Ok(Some(response))
            }
            Ok(None) => {
                tracing::debug!("No acknowledgement within {:?}", wait);
                Ok(None)
            }
            Err(e) => {
                self.mark_down(&e);
                Err(LinkError::LinkDown(e.to_string()))
            }
        }
    }

    pub fn health(&self) -> LinkHealth {
        if self.port.is_some() {
            LinkHealth::Connected
        } else {
            LinkHealth::Disconnected
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Release the serial handle.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::info!(
                "Closed serial link {} ({:?})",
                self.port_name.as_deref().unwrap_or("<none>"),
                self.stats
            );
        }
        self.last_sent = None;
    }
}

impl std::fmt::Debug for BoardLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardLink")
            .field("port", &self.port_name)
            .field("health", &self.health())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSerial, link_settings};

    async fn link(serial: &RecordingSerial) -> BoardLink {
        BoardLink::discover(Arc::new(serial.clone()), link_settings(&["/dev/ttyUSB0"]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_discovery_picks_first_openable_candidate() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyACM0", "/dev/ttyUSB1"]);
        let settings = link_settings(&["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyACM0"]);
        let link = BoardLink::discover(Arc::new(serial.clone()), settings).await.unwrap();
        assert_eq!(link.port_name(), Some("/dev/ttyUSB1"));
        assert_eq!(serial.opened(), vec!["/dev/ttyUSB1".to_string()]);
    }

    #[tokio::test]
    async fn test_discovery_with_no_candidates_fails() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let result = BoardLink::discover(Arc::new(serial), link_settings(&[])).await;
        assert!(matches!(result, Err(LinkError::NoTransportAvailable { tried }) if tried.is_empty()));
    }

    #[tokio::test]
    async fn test_discovery_scans_available_ports() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyAMA3"]);
        let mut settings = link_settings(&["/dev/ttyUSB0"]);
        settings.scan_available = true;
        let link = BoardLink::discover(Arc::new(serial), settings).await.unwrap();
        assert_eq!(link.port_name(), Some("/dev/ttyAMA3"));
    }

    #[tokio::test]
    async fn test_identical_lines_written_once() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        assert!(link.send("forward", false).await.is_ok());
        assert!(link.send("forward", false).await.is_ok());
        assert!(link.send("standby", false).await.is_ok());
        assert!(link.send("forward", false).await.is_ok());
        assert_eq!(serial.writes(), vec!["forward", "standby", "forward"]);
        assert_eq!(link.stats().lines_deduplicated, 1);
    }

    #[tokio::test]
    async fn test_ack_returns_response_line() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        serial.queue_reply("OK");
        assert_eq!(link.send("LFC:90", true).await.unwrap(), Some("OK".to_string()));
        assert_eq!(link.send("LFC:91", true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_failure_reconnects_and_retries_once() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        serial.fail_next_writes(1);
        assert!(link.send("LFC:90", false).await.is_ok());
        assert_eq!(serial.writes(), vec!["LFC:90"]);
        assert_eq!(serial.opened().len(), 2);
        assert_eq!(link.health(), LinkHealth::Connected);
        assert_eq!(link.stats().reconnects, 1);
    }

    #[tokio::test]
    async fn test_link_down_when_device_gone() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        serial.unplug("/dev/ttyUSB0");
        serial.fail_next_writes(1);
        assert!(matches!(link.send("forward", false).await, Err(LinkError::LinkDown(_))));
        assert_eq!(link.health(), LinkHealth::Disconnected);

        // Device back: the next send reconnects on its own.
        serial.plug("/dev/ttyUSB0");
        assert!(link.send("forward", false).await.is_ok());
        assert_eq!(serial.writes(), vec!["forward"]);
        assert_eq!(link.health(), LinkHealth::Connected);
    }

    #[tokio::test]
    async fn test_send_reconnects_at_most_once() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        serial.unplug("/dev/ttyUSB0");
        serial.fail_next_writes(1);
        assert!(link.send("forward", false).await.is_err());
        assert_eq!(link.stats().reconnects, 1);

        // Reconnect succeeds but the write after it fails: no second discovery.
        serial.plug("/dev/ttyUSB0");
        serial.fail_next_writes(1);
        let opened = serial.opened().len();
        assert!(matches!(link.send("forward", false).await, Err(LinkError::LinkDown(_))));
        assert_eq!(link.stats().reconnects, 2);
        assert_eq!(serial.opened().len(), opened + 1);
        assert_eq!(link.health(), LinkHealth::Disconnected);

        assert!(link.send("forward", false).await.is_ok());
        assert_eq!(serial.writes(), vec!["forward"]);
    }

    #[tokio::test]
    async fn test_ack_ignores_stale_controller_output() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        serial.queue_reply("stale");
        serial.queue_reply("fresh");
        link.send("forward", false).await.unwrap();
        assert_eq!(link.send("LFC:90", true).await.unwrap(), Some("fresh".to_string()));
        assert_eq!(serial.discards(), 1);
    }

    #[tokio::test]
    async fn test_failure_clears_dedup_memory() {
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut link = link(&serial).await;
        link.send("forward", false).await.unwrap();
        serial.unplug("/dev/ttyUSB0");
        serial.fail_next_writes(1);
        assert!(link.send("backward", false).await.is_err());
        serial.plug("/dev/ttyUSB0");
        link.send("forward", false).await.unwrap();
        assert_eq!(serial.writes(), vec!["forward", "forward"]);
    }
}
