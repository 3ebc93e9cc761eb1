// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Closed-loop chassis fan control for IPMI-managed servers.
//!
//! Each poll reads CPU temperatures from the BMC, smooths them over a short
//! rolling window, maps the result to a fan duty cycle through an easing
//! curve, and sends it back. Controller state is persisted after every poll
//! so restarts pick up where they left off.

pub mod config;
pub mod controller;
pub mod curve;
pub mod error;
pub mod gateway;
pub mod ipmitool;
pub mod poll_loop;
pub mod sensor;
pub mod state;
pub mod window;

#[cfg(test)]
mod test_utils;

pub use error::{FanctlError, Result};
