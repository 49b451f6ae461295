use hexapod_bridge::config::{Config, MotionConfig, NetworkConfig, SerialConfig};
use hexapod_bridge::testing::RecordingSerial;
use hexapod_rs::{CommandClient, ResponsePoller, parse_console_line};
use hexapod_shared::protocol::{Command, ControlCommand, MAX_DATAGRAM, Response};
use hexapod_shared::ServoId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_client_sends_encoded_command() {
    let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client = CommandClient::connect(bridge.local_addr().unwrap()).await.unwrap();

    let command = Command::SetAngles(BTreeMap::from([(ServoId::new("LFC").unwrap(), 45)]));
    client.send(&command).await.unwrap();

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let (len, _) = tokio::time::timeout(WAIT, bridge.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Command::decode(&buf[..len]).unwrap(), command);
}

#[tokio::test]
async fn test_poller_skips_undecodable_datagrams() {
    let mut poller = ResponsePoller::bind("127.0.0.1:0".parse().unwrap(), 4).await.unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = poller.local_addr();

    sender.send_to(b"garbage", target).await.unwrap();
    sender.send_to(br#"{"type": "unknown"}"#, target).await.unwrap();
    let error = Response::Error {
        message: "unknown servo 'XYZ'".to_string(),
    };
    sender.send_to(&error.encode().unwrap(), target).await.unwrap();

    assert_eq!(poller.recv_timeout(WAIT).await, Some(error));
}

#[tokio::test]
async fn test_recv_timeout_without_responses() {
    let mut poller = ResponsePoller::bind("127.0.0.1:0".parse().unwrap(), 1).await.unwrap();
    assert_eq!(poller.recv_timeout(Duration::from_millis(50)).await, None);
}

#[tokio::test]
async fn test_operator_round_trip_through_bridge() {
    let dir = tempdir().unwrap();
    let mut poller = ResponsePoller::bind("127.0.0.1:0".parse().unwrap(), 8).await.unwrap();
    let config = Config {
        calibration_file: dir.path().join("servo_config.json").to_string_lossy().into_owned(),
        serial: SerialConfig {
            candidates: vec!["/dev/ttyACM0".to_string()],
            baud: 115200,
            read_timeout_ms: 10,
            settle_ms: 0,
            scan_available: false,
        },
        network: NetworkConfig {
            listen: "127.0.0.1".to_string(),
            port: Some(0),
            response_port: Some(poller.local_addr().port()),
        },
        motion: MotionConfig {
            settle_delay_ms: 0,
            stand_ack: false,
            stand_on_startup: false,
            shutdown_delay_ms: 0,
        },
    };
    let serial = RecordingSerial::with_ports(&["/dev/ttyACM0"]);
    let (mut service, channel) = hexapod_bridge::start(&config, Arc::new(serial.clone()))
        .await
        .unwrap();
    let client = CommandClient::connect(channel.local_addr().unwrap()).await.unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        service
            .run(&channel, async {
                let _ = stopped.await;
            })
            .await;
    });

    for line in ["RFT=100 RFC=80", "backward", "status"] {
        let command = parse_console_line(line).unwrap().unwrap();
        client.send(&command).await.unwrap();
    }
    let Some(Response::Status { mode, last_physical, .. }) = poller.recv_timeout(WAIT).await else {
        panic!("expected status response");
    };
    assert_eq!(mode, "backward");
    assert_eq!(last_physical[&ServoId::new("RFT").unwrap()], 100);

    client
        .send(&Command::Control(ControlCommand::GetValues))
        .await
        .unwrap();
    assert!(matches!(
        poller.recv_timeout(WAIT).await,
        Some(Response::CurrentValues { .. })
    ));

    stop.send(()).unwrap();
    tokio::time::timeout(WAIT, running).await.unwrap().unwrap();
    assert_eq!(serial.writes(), vec!["RFC:80,RFT:100", "backward", "standby"]);
}
