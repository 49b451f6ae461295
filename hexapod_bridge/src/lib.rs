// hexapod_bridge: relays operator commands to the hexapod motor controller
pub mod bridge;
pub mod calibration;
pub mod channel;
pub mod config;
pub mod hardware;
pub mod motion;
pub mod state;
pub mod testing;

pub use bridge::{BridgeError, BridgeService, Phase};
pub use calibration::{CalibrationError, CalibrationStore};
pub use channel::BridgeChannel;
pub use config::Config;
pub use hardware::{BoardLink, LinkError};
pub use motion::{MotionError, MotionOrchestrator};

use hexapod_shared::RESPONSE_PORT_OFFSET;
use hexapod_shared::serial_interface::SerialInterface;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("invalid listen address '{0}'")]
    ListenAddress(String),
    #[error("cannot bind command socket: {0}")]
    Io(#[from] std::io::Error),
}

/// Bring the bridge up: load calibration, discover the controller, bind the
/// command channel and, if configured, stand the robot up.
///
/// Only a missing serial transport or an unusable listen address is fatal.
pub async fn start(
    config: &Config,
    interface: Arc<dyn SerialInterface>,
) -> Result<(BridgeService, BridgeChannel), StartupError> {
    let calibration = CalibrationStore::load(&config.calibration_file);

    let link = BoardLink::discover(interface, config.serial.link_settings()).await?;
    let motion = MotionOrchestrator::new(link, config.motion.motion_settings());

    let ip: IpAddr = config
        .network
        .listen
        .parse()
        .map_err(|_| StartupError::ListenAddress(config.network.listen.clone()))?;
    let port = config.network.port.unwrap_or(calibration.port());
    let response_port = config
        .network
        .response_port
        .unwrap_or(port.saturating_add(RESPONSE_PORT_OFFSET));
    let channel = BridgeChannel::bind(SocketAddr::new(ip, port), response_port).await?;

    let mut service = BridgeService::new(calibration, motion)
        .with_shutdown_delay(Duration::from_millis(config.motion.shutdown_delay_ms));
    if config.motion.stand_on_startup {
        if let Err(e) = service.stand().await {
            tracing::warn!("Stand on startup failed: {}", e);
        }
    }
    Ok((service, channel))
}
