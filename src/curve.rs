// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Easing curves mapping CPU temperature to a fan duty cycle.
//!
//! Below `ideal_temp` the fans get 0%; at or above `max_temp` they get
//! `max_duty_cycle`. In between, the selected curve decides the ramp.
//! Results are truncated toward zero, never rounded.

use crate::config::ControlConfig;
use crate::error::{FanctlError, Result};
use std::fmt;
use std::str::FromStr;

/// Supported ramp shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EasingCurve {
    /// Duty cycle proportional to the offset above `ideal_temp`.
    #[default]
    Linear,
    /// Duty cycle proportional to the squared offset: quiet near
    /// `ideal_temp`, steep approaching `max_temp`.
    Parabolic,
}

impl FromStr for EasingCurve {
    type Err = FanctlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(EasingCurve::Linear),
            "parabolic" => Ok(EasingCurve::Parabolic),
            other => Err(FanctlError::Configuration(format!(
                "Unrecognized easing type \"{other}\" (expected linear or parabolic)"
            ))),
        }
    }
}

impl fmt::Display for EasingCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EasingCurve::Linear => f.write_str("linear"),
            EasingCurve::Parabolic => f.write_str("parabolic"),
        }
    }
}

/// Immutable curve parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanCurve {
    pub ideal_temp: f64,
    pub max_temp: f64,
    /// Percent, at most 100
    pub max_duty_cycle: u8,
    pub easing: EasingCurve,
}

impl Default for FanCurve {
    fn default() -> Self {
        Self {
            ideal_temp: 40.0,
            max_temp: 75.0,
            max_duty_cycle: 100,
            easing: EasingCurve::Linear,
        }
    }
}

impl FanCurve {
    /// Build a curve from control settings. Fails on an unknown easing
    /// selector or on an empty temperature range.
    pub fn from_config(cfg: &ControlConfig) -> Result<Self> {
        let curve = Self {
            ideal_temp: cfg.ideal_temp,
            max_temp: cfg.max_temp,
            max_duty_cycle: cfg.max_duty_cycle,
            easing: cfg.easing.parse()?,
        };
        curve.validate()?;
        Ok(curve)
    }

    /// Duty cycle in percent for a temperature in degrees Celsius.
    pub fn duty_cycle(&self, temp_c: f64) -> u8 {
        let offset = temp_c - self.ideal_temp;
        if offset < 0.0 {
            return 0;
        }

        let range = self.max_temp - self.ideal_temp;
        let max = f64::from(self.max_duty_cycle);
        let speed = match self.easing {
            EasingCurve::Linear => max * offset / range,
            EasingCurve::Parabolic => max * (offset * offset) / (range * range),
        };

        // `as` saturates, and truncates toward zero.
        (speed as u64).min(u64::from(self.max_duty_cycle)) as u8
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_duty_cycle > 100 {
            return Err(FanctlError::Configuration(format!(
                "max_duty_cycle must be at most 100 (got {})",
                self.max_duty_cycle
            )));
        }
        if !(self.max_temp > self.ideal_temp) {
            return Err(FanctlError::Configuration(format!(
                "max_temp ({}) must be greater than ideal_temp ({})",
                self.max_temp, self.ideal_temp
            )));
        }
        Ok(())
    }
}
