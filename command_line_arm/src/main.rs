//! # Command Line Arm Console
//!
//! A small interactive console for the arm controller. Commands typed at the
//! prompt are sent over the command channel, and state updates pushed by the
//! controller are printed as they arrive.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::Result;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};
use std::str::FromStr;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

use comms_if::eqpt::arm::{ArmPose, JointId};
use comms_if::net::{ClientSocket, NetParams};
use comms_if::tc::{DebugCmd, StateUpdate};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "Deimos $ ";
const HISTORY_PATH: &str = "history.txt";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "command_line_arm", about = "Interactive arm console")]
struct Opts {
    /// Address of the arm controller.
    #[structopt(long, default_value = "127.0.0.1")]
    addr: String,

    /// Port of the controller's command channel.
    #[structopt(long, default_value = "4400")]
    port: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands accepted at the prompt.
#[derive(Debug, StructOpt)]
#[structopt(name = "", no_version, setting = structopt::clap::AppSettings::NoBinaryName)]
enum ConsoleCmd {
    /// Request a full state update from the controller.
    Update,

    /// Set joint angles, e.g. `angles base=45 elbow=90`.
    Angles {
        /// Joint angles as `<joint>=<degrees>` pairs.
        #[structopt(required = true)]
        angles: Vec<String>,
    },

    /// Open or close the grabber.
    Grabber {
        /// `open` or `closed`.
        state: String,
    },

    /// Enable or disable the autopilot.
    Autopilot {
        /// `on` or `off`.
        state: String,
    },

    /// Save the controller's latest camera frame.
    Picture,

    /// Quit the console.
    Exit,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opts = Opts::from_args();
    let net_params = NetParams {
        server_addr: opts.addr.clone(),
        command_port: opts.port,
        video_port: 0,
    };

    let socket = ClientSocket::new(&net_params.server_addr, net_params.command_port);
    socket.start();

    println!(
        "Connecting to {}:{}...",
        net_params.server_addr, net_params.command_port
    );

    // Print pushed state updates in the background
    spawn_update_printer(&socket);

    run_repl(&socket)?;

    socket.stop();
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run the prompt loop until `exit` or end of input.
fn run_repl(socket: &ClientSocket) -> RlResult<()> {
    let mut rl = DefaultEditor::new()?;
    if rl.load_history(HISTORY_PATH).is_err() {
        println!("No history detected");
    }

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match parse_line(line) {
                    Ok(Some(cmd)) => send_cmd(socket, &cmd),
                    Ok(None) => break,
                    Err(e) => println!("{}", e),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Unhandled error: {:?}", err);
                break;
            }
        }
    }

    rl.save_history(HISTORY_PATH)?;
    Ok(())
}

/// Parse one line into a command to send, `None` meaning exit.
fn parse_line(line: &str) -> Result<Option<DebugCmd>, String> {
    let words = line.split_whitespace();
    let cmd = ConsoleCmd::from_iter_safe(words).map_err(|e| e.message)?;

    let cmd = match cmd {
        ConsoleCmd::Update => DebugCmd::GetUpdate,
        ConsoleCmd::Angles { angles } => DebugCmd::SetAngles {
            angles: parse_angles(&angles)?,
        },
        ConsoleCmd::Grabber { state } => match state.as_str() {
            "open" => DebugCmd::SetGrabber { closed: false },
            "closed" => DebugCmd::SetGrabber { closed: true },
            s => return Err(format!("Expected open or closed, got {}", s)),
        },
        ConsoleCmd::Autopilot { state } => match state.as_str() {
            "on" => DebugCmd::SetAutopilot { enabled: true },
            "off" => DebugCmd::SetAutopilot { enabled: false },
            s => return Err(format!("Expected on or off, got {}", s)),
        },
        ConsoleCmd::Picture => DebugCmd::TakePicture,
        ConsoleCmd::Exit => return Ok(None),
    };

    Ok(Some(cmd))
}

/// Parse `<joint>=<degrees>` pairs into a pose.
fn parse_angles(pairs: &[String]) -> Result<ArmPose, String> {
    let mut pose = ArmPose::new();

    for pair in pairs {
        let mut parts = pair.splitn(2, '=');
        let joint = parts.next().unwrap_or("");
        let angle = parts
            .next()
            .ok_or_else(|| format!("Expected <joint>=<degrees>, got {}", pair))?;

        let joint = JointId::from_str(joint).map_err(|e| e.to_string())?;
        let angle: f64 = angle
            .parse()
            .map_err(|_| format!("{} is not a valid angle", angle))?;

        pose.set(joint, angle);
    }

    Ok(pose)
}

fn send_cmd(socket: &ClientSocket, cmd: &DebugCmd) {
    if !socket.send(cmd.to_json().as_bytes()) {
        println!("Could not send the command, is the controller up?");
    }
}

/// Spawn a thread which prints every state update pushed by the controller.
fn spawn_update_printer(socket: &ClientSocket) {
    let socket = socket.clone();

    thread::spawn(move || loop {
        match socket.receive() {
            Some(payload) => match std::str::from_utf8(&payload)
                .ok()
                .and_then(|t| StateUpdate::from_json(t).ok())
            {
                Some(update) => print_update(&update),
                None => println!("<- Unparseable update"),
            },
            None => thread::sleep(Duration::from_millis(50)),
        }
    });
}

fn print_update(update: &StateUpdate) {
    if let Some(ref angles) = update.angles {
        let mut parts: Vec<String> = angles
            .iter()
            .map(|(joint, angle)| format!("{:?}={:.1}", joint, angle))
            .collect();
        parts.sort();
        println!("<- Angles: {}", parts.join(" "));
    }
    if let Some(ref autopilot) = update.autopilot {
        println!("<- Autopilot: {}", autopilot);
    }
    if let Some(grabber) = update.grabber {
        println!("<- Grabber: {}", if grabber { "closed" } else { "open" });
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
