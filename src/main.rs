// src/main.rs - Operator command line for the hexapod bridge
use clap::{Parser, Subcommand};
use hexapod_rs::{CommandClient, OperatorError, ResponsePoller, parse_assignment, parse_console_line};
use hexapod_shared::RESPONSE_PORT_OFFSET;
use hexapod_shared::calibration_file::CalibrationFile;
use hexapod_shared::protocol::{CalibrationUpdate, Command, ControlCommand, Response};
use hexapod_shared::servo::ServoId;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "hexapod", about = "Sends commands to the hexapod bridge")]
struct Cli {
    /// Calibration file holding the bridge address
    #[arg(long, default_value = "servo_config.json")]
    calibration: String,
    /// Bridge address, overriding the calibration file
    #[arg(long)]
    ip: Option<IpAddr>,
    /// Bridge command port, overriding the calibration file
    #[arg(long)]
    port: Option<u16>,
    /// Local port the bridge answers on (default: command port + 1)
    #[arg(long)]
    response_port: Option<u16>,
    /// How long to wait for a response
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
    #[arg(long, default_value = "warn")]
    log_level: tracing::Level,
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Set logical angles, e.g. `set LFC=45 LFT=90`
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    /// Send a control command by name (stand, forward, standby, ...)
    Command { name: String },
    /// Print the bridge's calibration table
    Values,
    /// Print the bridge's motion state
    Status,
    /// Change one servo's calibration
    Calibrate {
        servo: String,
        #[arg(long, allow_hyphen_values = true)]
        angle: Option<i32>,
        #[arg(long)]
        inverted: Option<bool>,
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i32>,
    },
    /// Read commands from stdin, one per line, printing responses as they arrive
    Console,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let (file, _) = CalibrationFile::load(&cli.calibration);
    let ip = match cli.ip {
        Some(ip) => ip,
        None => file.ip.parse()?,
    };
    let port = cli.port.unwrap_or(file.port);
    let bridge = SocketAddr::new(ip, port);
    let response_port = cli
        .response_port
        .unwrap_or(port.saturating_add(RESPONSE_PORT_OFFSET));
    let wait = Duration::from_millis(cli.timeout_ms);
    tracing::info!("Bridge at {}, responses on port {}", bridge, response_port);

    let client = CommandClient::connect(bridge).await?;
    match cli.action {
        Action::Set { assignments } => {
            let angles = assignments
                .iter()
                .map(|a| parse_assignment(a))
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            client.send(&Command::SetAngles(angles)).await?;
        }
        Action::Command { name } => {
            let control = ControlCommand::from_parts(&name, Default::default()).map_err(OperatorError::from)?;
            client.send(&Command::Control(control)).await?;
        }
        Action::Values => {
            request(&client, response_port, ControlCommand::GetValues, wait).await?;
        }
        Action::Status => {
            request(&client, response_port, ControlCommand::Status, wait).await?;
        }
        Action::Calibrate {
            servo,
            angle,
            inverted,
            offset,
        } => {
            let update = CalibrationUpdate {
                servo: ServoId::new(servo)?,
                angle,
                inverted,
                offset,
            };
            request(&client, response_port, ControlCommand::Calibrate(update), wait).await?;
        }
        Action::Console => console(&client, response_port).await?,
    }
    Ok(())
}

fn unspecified(port: u16) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], port))
}

fn print_response(response: &Response) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

/// Send one control command and print the bridge's answer.
async fn request(
    client: &CommandClient,
    response_port: u16,
    control: ControlCommand,
    wait: Duration,
) -> Result<(), BoxError> {
    let mut poller = ResponsePoller::bind(unspecified(response_port), 4).await?;
    client.send(&Command::Control(control)).await?;
    let response = poller
        .recv_timeout(wait)
        .await
        .ok_or(OperatorError::Timeout(wait))?;
    print_response(&response)?;
    if let Response::Error { message } = response {
        return Err(message.into());
    }
    Ok(())
}

async fn console(client: &CommandClient, response_port: u16) -> Result<(), BoxError> {
    let mut poller = ResponsePoller::bind(unspecified(response_port), 16).await?;
    let printer = tokio::spawn(async move {
        while let Some(response) = poller.recv().await {
            if let Err(e) = print_response(&response) {
                tracing::warn!("Cannot print response: {}", e);
            }
        }
    });

    eprintln!("Connected to {}. Enter ID=ANGLE pairs or a command name; 'quit' exits.", client.bridge());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        match parse_console_line(&line) {
            Ok(Some(command)) => client.send(&command).await?,
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
        }
    }
    printer.abort();
    Ok(())
}
