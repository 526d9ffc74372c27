//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Debug command definitions and parsing
pub mod tc;

/// Data definitions for equipment (the arm itself)
pub mod eqpt;

/// Network module
pub mod net;
