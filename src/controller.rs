// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! One control cycle: read, aggregate, decide, act, persist.
//!
//! Every failure inside a cycle comes back as a [`CycleReport`] with an
//! `Err` result instead of unwinding; the loop driver decides from
//! [`FanctlError::is_fatal`] whether to keep going. State is saved after
//! every cycle whatever the outcome.

use crate::config::Config;
use crate::curve::FanCurve;
use crate::error::{FanctlError, Result};
use crate::gateway::SensorGateway;
use crate::sensor::SensorIdentities;
use crate::state::{self, ControllerState};
use chrono::{DateTime, Local, Utc};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%x %X";

/// What a successful cycle did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Not enough samples since the last reset; fans left alone.
    Collecting {
        collected: usize,
        required: usize,
        temperature: f64,
    },
    /// A duty cycle was chosen, and sent unless `dry_run`.
    Applied {
        temperature: f64,
        duty_cycle: u8,
        dry_run: bool,
    },
}

#[derive(Debug)]
pub struct CycleReport {
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub result: Result<CycleOutcome>,
}

pub struct FanController<G> {
    gateway: G,
    curve: FanCurve,
    state_path: PathBuf,
    sample_size: usize,
    dry_run: bool,
}

impl<G: SensorGateway> FanController<G> {
    /// Validate the control settings and build the curve. An unknown
    /// easing selector fails here, before the gateway is ever used.
    pub fn new(gateway: G, cfg: &Config) -> Result<Self> {
        cfg.control.validate()?;
        let curve = FanCurve::from_config(&cfg.control)?;
        let state_path = state::state_file_path(&cfg.state_dir(), &cfg.identity());

        Ok(Self {
            gateway,
            curve,
            state_path,
            sample_size: cfg.control.sample_size,
            dry_run: cfg.control.dry_run,
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn curve(&self) -> &FanCurve {
        &self.curve
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn load_state(&self) -> Result<ControllerState> {
        ControllerState::load(&self.state_path, self.sample_size)
    }

    pub fn save_state(&self, state: &ControllerState) -> Result<()> {
        state.save(&self.state_path)
    }

    /// Hand fan control back to the BMC.
    pub fn restore_dynamic(&self) -> Result<()> {
        self.gateway.set_dynamic_mode()?;
        log::info!("Restored dynamic fan control");
        Ok(())
    }

    /// Run one poll cycle against `state`.
    pub fn poll(&self, state: &mut ControllerState) -> CycleReport {
        let started = Local::now();
        log::info!("--- Poll start: {}", started.format(TIMESTAMP_FORMAT));

        let result = self.run_cycle(state);
        if let Err(e) = &result {
            log::error!("Poll failed: {e}");
        }

        if let Err(e) = self.save_state(state) {
            log::error!("Failed to save state: {e}");
        }

        let finished = Local::now();
        log::info!("--- Poll end: {}", finished.format(TIMESTAMP_FORMAT));

        CycleReport {
            started,
            finished,
            result,
        }
    }

    fn run_cycle(&self, state: &mut ControllerState) -> Result<CycleOutcome> {
        if state.sensors.is_none() {
            self.discover(state)?;
        }

        let sensors = state
            .sensors
            .as_mut()
            .ok_or_else(|| FanctlError::Parse("Sensor discovery yielded nothing".to_string()))?;
        let cpu_temp = self.read_cpu(sensors)?;
        let aggregate = state.window.add_sample(cpu_temp, Utc::now());

        // Keep the new sample even if fan control fails below.
        self.save_state(state)?;

        let collected = state.window.samples().len();
        let required = state.window.sample_size();
        if !state.window.is_full() {
            log::info!("Collected {collected}/{required} samples.");
            return Ok(CycleOutcome::Collecting {
                collected,
                required,
                temperature: aggregate,
            });
        }

        log::info!("Aggregate CPU temperature: {aggregate:.1}C");
        let duty_cycle = self.curve.duty_cycle(aggregate);
        log::info!("Suggested fan speed: {duty_cycle}%");

        if self.dry_run {
            log::info!("Dry run mode: not setting fan speed");
        } else {
            self.gateway.set_fan_duty_cycle(duty_cycle)?;
        }

        if let Some(sensors) = state.sensors.as_mut() {
            self.read_fans(sensors)?;
        }

        Ok(CycleOutcome::Applied {
            temperature: aggregate,
            duty_cycle,
            dry_run: self.dry_run,
        })
    }

    fn discover(&self, state: &mut ControllerState) -> Result<()> {
        log::info!("--- Discover sensors");
        let fans = self.gateway.discover_fan_sensors()?;
        let cpus = self.gateway.discover_cpu_sensors()?;

        if cpus.is_empty() {
            return Err(FanctlError::Parse(
                "No CPU temperature sensors found".to_string(),
            ));
        }
        if fans.is_empty() {
            log::warn!("No fan sensors found; fan status will not be reported");
        }

        state.sensors = Some(SensorIdentities::from_discovery(cpus, fans));
        self.save_state(state)
    }

    /// Refresh every CPU sensor and return the hottest reading.
    fn read_cpu(&self, sensors: &mut SensorIdentities) -> Result<f64> {
        let temps = self.gateway.read_cpu_temperatures(&sensors.cpu_ids())?;
        if temps.is_empty() {
            return Err(FanctlError::Parse(
                "No CPU temperature readings returned".to_string(),
            ));
        }

        for cpu in sensors.cpus.values_mut() {
            match temps.get(&cpu.id) {
                Some(&t) => cpu.temp = t,
                None => log::warn!("No reading for {}, keeping {}C", cpu.key(), cpu.temp),
            }
        }
        sensors.log_cpus();

        sensors
            .max_cpu_temp()
            .ok_or_else(|| FanctlError::Parse("No CPU temperature sensors known".to_string()))
    }

    fn read_fans(&self, sensors: &mut SensorIdentities) -> Result<()> {
        let readings = self.gateway.read_fan_status(&sensors.fan_ids())?;
        for fan in sensors.fans.values_mut() {
            match readings.get(&fan.id) {
                Some(reading) => fan.apply(reading),
                None => log::warn!("No status for {}, keeping last reading", fan.name),
            }
        }
        sensors.log_fans();
        Ok(())
    }
}
