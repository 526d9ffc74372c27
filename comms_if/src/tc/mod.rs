//! # Debug command module
//!
//! This module provides the command protocol spoken between the operator
//! console and the arm controller. Commands are small JSON envelopes of the
//! form `{"type": "<CODE>", "data": {...}}`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use serde_json::{self, json, Value};
use thiserror::Error;

// Internal
use crate::eqpt::arm::ArmPose;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A debug command, i.e. an instruction sent to the arm controller by an
/// operator console.
#[derive(Debug, Clone, PartialEq)]
pub enum DebugCmd {
    /// Request a full state update from the controller.
    GetUpdate,

    /// Set the angles of the arm's joints. Partial poses move only the named
    /// joints.
    SetAngles { angles: ArmPose },

    /// Set the open/closed state of the grabber. `closed = true` closes it.
    SetGrabber { closed: bool },

    /// Enable/disable the autopilot.
    SetAutopilot { enabled: bool },

    /// Save the latest camera frame to the controller's session directory.
    TakePicture,
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum CmdParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command has an invalid type ({0})")]
    InvalidType(String),

    #[error("Command data doesn't match the command type: {0}")]
    InvalidData(serde_json::Error),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A state update pushed from the controller to all connected consoles.
///
/// All fields are optional, only changed/known fields are included. On the
/// wire an update is a `GET_UPD` envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateUpdate {
    /// Current angles of all joints, in degrees.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angles: Option<ArmPose>,

    /// Name of the current autopilot state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<String>,

    /// True if the grabber is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grabber: Option<bool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DebugCmd {
    /// The wire code for this command.
    pub fn code(&self) -> &'static str {
        match self {
            DebugCmd::GetUpdate => "GET_UPD",
            DebugCmd::SetAngles { .. } => "SET_ANG",
            DebugCmd::SetGrabber { .. } => "SET_GRB",
            DebugCmd::SetAutopilot { .. } => "SET_AUT",
            DebugCmd::TakePicture => "TAK_PIC",
        }
    }

    /// Parse a new command from a JSON packet.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        // Parse the JSON string into a value
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CmdParseError::InvalidJson(e)),
        };

        // Get the type code of the command
        let code = match val["type"].as_str() {
            Some(s) => s,
            None => {
                return Err(CmdParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        };

        let data = val["data"].clone();

        // Deserialise the data payload based on the type code
        match code {
            "GET_UPD" => Ok(DebugCmd::GetUpdate),
            "TAK_PIC" => Ok(DebugCmd::TakePicture),
            "SET_ANG" => {
                let angles: ArmPose = serde_json::from_value(data["angles"].clone())
                    .map_err(CmdParseError::InvalidData)?;
                Ok(DebugCmd::SetAngles { angles })
            }
            "SET_GRB" => {
                let closed: bool = serde_json::from_value(data["closed"].clone())
                    .map_err(CmdParseError::InvalidData)?;
                Ok(DebugCmd::SetGrabber { closed })
            }
            "SET_AUT" => {
                let enabled: bool = serde_json::from_value(data["enabled"].clone())
                    .map_err(CmdParseError::InvalidData)?;
                Ok(DebugCmd::SetAutopilot { enabled })
            }
            _ => Err(CmdParseError::InvalidType(format!(
                "{} is not a recognised command type",
                code
            ))),
        }
    }

    /// Serialise this command into its JSON envelope.
    pub fn to_json(&self) -> String {
        let data = match self {
            DebugCmd::GetUpdate | DebugCmd::TakePicture => json!({}),
            DebugCmd::SetAngles { angles } => json!({ "angles": angles }),
            DebugCmd::SetGrabber { closed } => json!({ "closed": closed }),
            DebugCmd::SetAutopilot { enabled } => json!({ "enabled": enabled }),
        };

        json!({
            "type": self.code(),
            "data": data,
        })
        .to_string()
    }
}

impl StateUpdate {
    /// Serialise this update into its `GET_UPD` JSON envelope.
    pub fn to_json(&self) -> String {
        json!({
            "type": "GET_UPD",
            "data": self,
        })
        .to_string()
    }

    /// Parse an update from a `GET_UPD` JSON envelope.
    pub fn from_json(json_str: &str) -> Result<Self, CmdParseError> {
        let val: Value = match serde_json::from_str(json_str) {
            Ok(v) => v,
            Err(e) => return Err(CmdParseError::InvalidJson(e)),
        };

        match val["type"].as_str() {
            Some("GET_UPD") => (),
            Some(s) => {
                return Err(CmdParseError::InvalidType(format!(
                    "Expected a GET_UPD envelope, found {}",
                    s
                )))
            }
            None => {
                return Err(CmdParseError::InvalidType(String::from(
                    "Expected \"type\" to be a string",
                )))
            }
        }

        serde_json::from_value(val["data"].clone()).map_err(CmdParseError::InvalidData)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
