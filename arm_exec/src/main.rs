//! # Arm Control Executable
//!
//! This executable is responsible for controlling the robot arm:
//! - Joint/trajectory control of the five joints and the grabber
//! - The autopilot supervisor running the pick and place cycle
//! - The command and video channels towards the operator consoles

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Robot arm joint/trajectory controller.
mod arm;

/// Autopilot supervisor.
mod auto;

/// Command dispatch.
mod cmd_handler;

/// Motion facade combining the arm and the kinematics solver.
mod ctrl;

/// Command and video channel servers.
mod debug_server;

/// Kinematics solvers.
mod kinematics;

/// Named joint-space poses.
mod locations;

/// Parameters for the arm executable.
mod params;

/// Driver used to control servos.
mod servo_ctrl;

/// Camera frame / board / world conversions.
mod transform;

/// Camera and classifier boundary.
mod vision;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use structopt::StructOpt;

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

use arm::RobotArm;
use auto::AutoPilot;
use cmd_handler::CommandHandler;
use ctrl::Controller;
use debug_server::DebugServer;
use kinematics::PlanarKinematics;
use params::ArmExecParams;
use servo_ctrl::{DummyServoDriver, ServoDriver};
use vision::{Camera, FrameStore, NullCamera, NullClassifier};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval between camera polls in the main loop.
const CAMERA_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "arm_exec", about = "Robot arm control executable")]
struct Opts {
    /// Run without the servo driver board, logging actuations instead of
    /// performing them.
    #[structopt(long)]
    no_board: bool,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("arm_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Arm Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: ArmExecParams =
        util::params::load("arm_exec.toml").wrap_err("Failed to load the parameters")?;

    info!("Parameters loaded");

    // ---- SERVO DRIVER ----

    let driver = get_driver(&opts).wrap_err("Failed to initialise the servo driver")?;

    // ---- SERVER INITIALISATION ----

    let server = Arc::new(DebugServer::new(params.command_port, params.video_port));

    // ---- ARM INITIALISATION ----

    let arm = RobotArm::new(&params, driver, server.clone())
        .wrap_err("Failed to initialise the arm")?;
    let ctrl = Arc::new(Controller::new(
        Arc::new(Mutex::new(arm)),
        Box::new(PlanarKinematics),
    ));

    info!("Arm initialised and at its initial pose");

    // ---- AUTOPILOT AND COMMAND HANDLING ----

    let frames = Arc::new(FrameStore::new());
    let camera: Box<dyn Camera> = Box::new(NullCamera);

    let autopilot = Arc::new(AutoPilot::new(
        ctrl.clone(),
        Arc::new(NullClassifier),
        frames.clone(),
        server.clone(),
    ));

    let handler = Arc::new(CommandHandler::new(
        ctrl,
        autopilot,
        server.clone(),
        frames.clone(),
        session,
    ));

    let handler_clone = handler.clone();
    server
        .start(move |raw, peer| handler_clone.exec_cmd(raw, peer))
        .wrap_err("Failed to start the channel servers")?;

    info!(
        "Command channel on port {}, video channel on port {}",
        params.command_port, params.video_port
    );

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    loop {
        if let Some(frame) = camera.capture() {
            server.send_video_frame(&frame);
            frames.put(frame);
        }

        std::thread::sleep(CAMERA_POLL_INTERVAL);
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the servo driver, either the PCA9685 board or the dummy.
#[cfg(target_arch = "arm")]
fn get_driver(opts: &Opts) -> Result<Box<dyn ServoDriver + Send>> {
    use color_eyre::eyre::eyre;
    use pwm_pca9685::{Pca9685, SlaveAddr};

    if opts.no_board {
        warn!("Running without the servo driver board, no servos will move");
        return Ok(Box::new(DummyServoDriver));
    }

    let i2c = rppal::i2c::I2c::new().wrap_err("Failed to open the I2C bus")?;
    let mut pca = Pca9685::new(i2c, SlaveAddr::default());

    // 50 Hz update rate: prescale = 25 MHz / (4096 * 50) - 1
    pca.set_prescale(121)
        .map_err(|_| eyre!("Failed to set the PWM prescale"))?;
    pca.enable()
        .map_err(|_| eyre!("Failed to enable the driver board"))?;

    Ok(Box::new(pca))
}

/// Build the servo driver. Off-target there is no I2C bus, so only the dummy
/// driver is available.
#[cfg(not(target_arch = "arm"))]
fn get_driver(opts: &Opts) -> Result<Box<dyn ServoDriver + Send>> {
    if !opts.no_board {
        warn!("No driver board support on this host, using the dummy driver");
    }

    Ok(Box::new(DummyServoDriver))
}
