// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! `ipmitool`-backed sensor gateway.
//!
//! Runs `ipmitool` for SDR queries and Dell raw fan commands, and parses
//! its text output into sensor readings.

use crate::config::IpmiConfig;
use crate::error::{FanctlError, Result};
use crate::gateway::SensorGateway;
use crate::sensor::{FanReading, SensorId};
use std::collections::BTreeMap;
use std::process::Command;

/// Name of CPU temperature rows in `sdr type temperature`.
const CPU_SENSOR_NAME: &str = "Temp";

/// Environment variable `ipmitool -E` reads the password from.
const PASSWORD_ENV: &str = "IPMI_PASSWORD";

// Dell PowerEdge OEM fan commands.
const RAW_MANUAL_MODE: [u8; 4] = [0x30, 0x30, 0x01, 0x00];
const RAW_DYNAMIC_MODE: [u8; 4] = [0x30, 0x30, 0x01, 0x01];
const RAW_SET_SPEED: [u8; 4] = [0x30, 0x30, 0x02, 0xff];

/// Key/value properties of one `sdr get` record, keyed by record header.
pub type SdrRecords = BTreeMap<String, BTreeMap<String, String>>;

// ---------------------------------------------------------------------------
// Command runner
// ---------------------------------------------------------------------------

pub struct Ipmitool {
    program: String,
    connection_args: Vec<String>,
    password: Option<String>,
}

impl Ipmitool {
    pub fn new(cfg: &IpmiConfig) -> Self {
        let mut connection_args = Vec::new();
        let mut password = None;

        if let Some(host) = &cfg.host {
            connection_args.extend(["-I".to_string(), cfg.interface.clone()]);
            connection_args.extend(["-H".to_string(), host.clone()]);
            if let Some(user) = &cfg.username {
                connection_args.extend(["-U".to_string(), user.clone()]);
            }
            if cfg.password.is_some() {
                connection_args.push("-E".to_string());
                password = cfg.password.clone();
            }
        }

        Self {
            program: cfg.tool.clone(),
            connection_args,
            password,
        }
    }

    /// Full argument list for a subcommand. The password never appears here.
    fn command_args(&self, args: &[String]) -> Vec<String> {
        self.connection_args
            .iter()
            .chain(args)
            .cloned()
            .collect()
    }

    fn run(&self, args: &[String]) -> Result<String> {
        let argv = self.command_args(args);
        log::debug!("{} {}", self.program, argv.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&argv);
        if let Some(pw) = &self.password {
            cmd.env(PASSWORD_ENV, pw);
        }

        let output = cmd.output().map_err(|e| {
            FanctlError::Transport(format!("Failed to run {}: {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FanctlError::Transport(format!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// `sdr type <kind>`, split into pipe-delimited rows.
    pub fn sdr_type(&self, kind: &str) -> Result<Vec<Vec<String>>> {
        let out = self.run(&["sdr".to_string(), "type".to_string(), kind.to_string()])?;
        Ok(parse_pdv(&out))
    }

    /// `sdr get <names...>`, parsed into one property map per record.
    pub fn sdr_get(&self, names: &[&str]) -> Result<SdrRecords> {
        let mut args = vec!["sdr".to_string(), "get".to_string()];
        args.extend(names.iter().map(|n| n.to_string()));
        let out = self.run(&args)?;
        Ok(parse_sdr_get(&out))
    }

    /// Send a raw request.
    pub fn raw(&self, data: &[u8]) -> Result<()> {
        let mut args = vec!["raw".to_string()];
        args.extend(data.iter().map(|b| format!("{b:#04x}")));
        self.run(&args).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct IpmiGateway {
    tool: Ipmitool,
}

impl IpmiGateway {
    pub fn new(cfg: &IpmiConfig) -> Self {
        Self {
            tool: Ipmitool::new(cfg),
        }
    }
}

impl SensorGateway for IpmiGateway {
    fn discover_cpu_sensors(&self) -> Result<Vec<SensorId>> {
        let rows = self.tool.sdr_type("temperature")?;
        let found = cpu_sensors_from_rows(&rows);
        for s in &found {
            log::info!("Found CPU temperature sensor: {} ({:#x})", s.name, s.id);
        }
        Ok(found)
    }

    fn discover_fan_sensors(&self) -> Result<Vec<SensorId>> {
        let rows = self.tool.sdr_type("fan")?;
        let found = fan_sensors_from_rows(&rows);
        for s in &found {
            log::info!("Found fan sensor: {} ({:#x})", s.name, s.id);
        }
        Ok(found)
    }

    fn read_cpu_temperatures(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, f64>> {
        let rows = self.tool.sdr_type("temperature")?;
        Ok(cpu_temperatures_from_rows(&rows, sensors))
    }

    fn read_fan_status(&self, sensors: &[SensorId]) -> Result<BTreeMap<u32, FanReading>> {
        if sensors.is_empty() {
            return Ok(BTreeMap::new());
        }
        let names: Vec<&str> = sensors.iter().map(|s| s.name.as_str()).collect();
        let records = self.tool.sdr_get(&names)?;
        Ok(fan_readings_from_records(&records, sensors))
    }

    fn set_fan_duty_cycle(&self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(FanctlError::Configuration(format!(
                "Fan duty cycle {percent}% is out of range"
            )));
        }
        self.tool.raw(&RAW_MANUAL_MODE)?;
        let mut cmd = RAW_SET_SPEED.to_vec();
        cmd.push(percent);
        self.tool.raw(&cmd)
    }

    fn set_dynamic_mode(&self) -> Result<()> {
        self.tool.raw(&RAW_DYNAMIC_MODE)
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Split pipe-delimited output into trimmed columns, one row per line.
pub fn parse_pdv(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.split('|').map(|col| col.trim().to_string()).collect())
        .collect()
}

/// Parse a sensor id written as `0x30`, `30h` or `30`.
pub fn parse_hex(text: &str) -> Option<u32> {
    let t = text.trim();
    let t = t.strip_suffix('h').or_else(|| t.strip_suffix('H')).unwrap_or(t);
    let t = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    u32::from_str_radix(t, 16).ok()
}

/// Parse `sdr get` output. Records start with an unindented
/// `Sensor ID : <name> (<id>)` line, followed by indented `key : value`
/// properties.
pub fn parse_sdr_get(text: &str) -> SdrRecords {
    let mut records = SdrRecords::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if line.starts_with(|c: char| !c.is_whitespace()) {
            let header = value.trim().to_string();
            records.entry(header.clone()).or_default();
            current = Some(header);
        } else if let Some(header) = &current {
            if let Some(props) = records.get_mut(header) {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    records
}

/// Leading run of digits, e.g. `2400` from `2400 (+/- 120) RPM`.
fn leading_integer(text: &str) -> Option<u32> {
    let t = text.trim_start();
    let end = t.find(|c: char| !c.is_ascii_digit()).unwrap_or(t.len());
    t[..end].parse().ok()
}

/// Split a record header `Fan1 (0x30)` into name and id.
fn parse_record_header(header: &str) -> Option<SensorId> {
    let (name, rest) = header.rsplit_once(" (")?;
    let id = parse_hex(rest.strip_suffix(')')?)?;
    Some(SensorId::new(name.trim(), id))
}

fn is_fan_name(name: &str) -> bool {
    name.strip_prefix("Fan")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn row_sensor(row: &[String]) -> Option<SensorId> {
    let name = row.first()?;
    let id = parse_hex(row.get(1)?)?;
    Some(SensorId::new(name.clone(), id))
}

fn cpu_sensors_from_rows(rows: &[Vec<String>]) -> Vec<SensorId> {
    rows.iter()
        .filter_map(|row| row_sensor(row))
        .filter(|s| s.name == CPU_SENSOR_NAME)
        .collect()
}

fn fan_sensors_from_rows(rows: &[Vec<String>]) -> Vec<SensorId> {
    rows.iter()
        .filter_map(|row| row_sensor(row))
        .filter(|s| is_fan_name(&s.name))
        .collect()
}

fn cpu_temperatures_from_rows(rows: &[Vec<String>], sensors: &[SensorId]) -> BTreeMap<u32, f64> {
    let mut temps = BTreeMap::new();

    for row in rows {
        let Some(found) = row_sensor(row) else {
            continue;
        };
        if !sensors.contains(&found) {
            continue;
        }
        match row.get(4).and_then(|v| leading_integer(v)) {
            Some(t) => {
                temps.insert(found.id, f64::from(t));
            }
            None => log::warn!(
                "Unable to parse temperature for {} ({:#x})",
                found.name,
                found.id
            ),
        }
    }

    temps
}

fn fan_readings_from_records(
    records: &SdrRecords,
    sensors: &[SensorId],
) -> BTreeMap<u32, FanReading> {
    let mut readings = BTreeMap::new();

    for (header, props) in records {
        let Some(found) = parse_record_header(header) else {
            continue;
        };
        let Some(sensor) = sensors.iter().find(|s| s.name == found.name) else {
            continue;
        };

        let rpm = props.get("Sensor Reading").and_then(|v| leading_integer(v));
        if rpm.is_none() {
            log::error!("Unable to get sensor reading for: {}", sensor.name);
        }
        let max = props.get("Normal Maximum").and_then(|v| leading_integer(v));
        if max.is_none() {
            log::error!("Unable to get sensor maximum for: {}", sensor.name);
        }

        readings.insert(sensor.id, FanReading { rpm, max });
    }

    readings
}
