// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Scripted in-memory gateway for controller and loop tests.

use crate::config::Config;
use crate::error::{FanctlError, Result};
use crate::gateway::SensorGateway;
use crate::sensor::{FanReading, SensorId};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;

pub(crate) struct FakeGateway {
    pub cpus: Vec<SensorId>,
    pub fans: Vec<SensorId>,
    /// Temperature reported for every CPU sensor.
    pub temp: Cell<f64>,
    /// CPU sensor id left out of every temperature read.
    pub missing_cpu: Cell<Option<u32>>,
    pub fan_reading: Cell<FanReading>,
    /// Number of upcoming CPU reads that fail with a transport error.
    pub failing_reads: Cell<u32>,
    /// Error kind returned by every duty-cycle write, if set.
    pub write_error: Cell<Option<fn() -> FanctlError>>,
    pub discover_calls: Cell<u32>,
    pub cpu_reads: Cell<u32>,
    pub fan_reads: Cell<u32>,
    pub duty_writes: RefCell<Vec<u8>>,
    pub dynamic_calls: Cell<u32>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            cpus: vec![SensorId::new("Temp", 0x0e), SensorId::new("Temp", 0x0f)],
            fans: vec![SensorId::new("Fan1", 0x30), SensorId::new("Fan2", 0x31)],
            temp: Cell::new(57.5),
            missing_cpu: Cell::new(None),
            fan_reading: Cell::new(FanReading {
                rpm: Some(4200),
                max: Some(16800),
            }),
            failing_reads: Cell::new(0),
            write_error: Cell::new(None),
            discover_calls: Cell::new(0),
            cpu_reads: Cell::new(0),
            fan_reads: Cell::new(0),
            duty_writes: RefCell::new(Vec::new()),
            dynamic_calls: Cell::new(0),
        }
    }
}

impl FakeGateway {
    pub fn writes(&self) -> Vec<u8> {
        self.duty_writes.borrow().clone()
    }
}

impl SensorGateway for FakeGateway {
    fn discover_cpu_sensors(&self) -> Result<Vec<SensorId>> {
        self.discover_calls.set(self.discover_calls.get() + 1);
        Ok(self.cpus.clone())
    }

    fn discover_fan_sensors(&self) -> Result<Vec<SensorId>> {
        Ok(self.fans.clone())
    }

    fn read_cpu_temperatures(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, f64>> {
        self.cpu_reads.set(self.cpu_reads.get() + 1);
        if self.failing_reads.get() > 0 {
            self.failing_reads.set(self.failing_reads.get() - 1);
            return Err(FanctlError::Transport("ipmitool exited with 1".to_string()));
        }
        Ok(sensors
            .iter()
            .filter(|s| Some(s.id) != self.missing_cpu.get())
            .map(|s| (s.id, self.temp.get()))
            .collect())
    }

    fn read_fan_status(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, FanReading>> {
        self.fan_reads.set(self.fan_reads.get() + 1);
        Ok(sensors
            .iter()
            .map(|s| (s.id, self.fan_reading.get()))
            .collect())
    }

    fn set_fan_duty_cycle(&self, percent: u8) -> Result<()> {
        if let Some(make_err) = self.write_error.get() {
            return Err(make_err());
        }
        self.duty_writes.borrow_mut().push(percent);
        Ok(())
    }

    fn set_dynamic_mode(&self) -> Result<()> {
        self.dynamic_calls.set(self.dynamic_calls.get() + 1);
        Ok(())
    }
}

/// Default config with its state file under `dir`.
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.controller.name = Some("test-bmc".to_string());
    cfg.controller.state_dir = Some(dir.to_path_buf());
    cfg
}
