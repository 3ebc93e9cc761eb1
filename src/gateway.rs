// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The boundary between the control loop and the BMC.
//!
//! The controller only sees this trait; how readings are fetched and
//! commands are sent (and what the vendor tool prints) stays behind it.
//! Calls are blocking and carry no timeout of their own.

use crate::error::Result;
use crate::sensor::{FanReading, SensorId};
use std::collections::BTreeMap;

pub trait SensorGateway {
    fn discover_cpu_sensors(&self) -> Result<Vec<SensorId>>;

    fn discover_fan_sensors(&self) -> Result<Vec<SensorId>>;

    /// Current temperature (C) per sensor id. Sensors that could not be
    /// read are left out of the map.
    fn read_cpu_temperatures(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, f64>>;

    /// Current fan status per sensor id.
    fn read_fan_status(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, FanReading>>;

    /// Take manual control of all fans and run them at `percent` (0-100).
    fn set_fan_duty_cycle(&self, percent: u8) -> Result<()>;

    /// Give fan control back to the BMC.
    fn set_dynamic_mode(&self) -> Result<()>;
}
