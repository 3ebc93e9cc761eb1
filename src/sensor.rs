// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Sensor entities discovered on the BMC and cached in the controller state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Name and numeric id of a sensor, as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorId {
    pub name: String,
    pub id: u32,
}

impl SensorId {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

/// A CPU temperature sensor and its last reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSensor {
    pub name: String,
    pub id: u32,
    /// Degrees Celsius
    pub temp: f64,
}

impl CpuSensor {
    /// Key used in [`SensorIdentities::cpus`]. CPU sensors often share a
    /// name, so the id is part of it.
    pub fn key(&self) -> String {
        format!("{} ({:#x})", self.name, self.id)
    }
}

impl From<SensorId> for CpuSensor {
    fn from(s: SensorId) -> Self {
        Self {
            name: s.name,
            id: s.id,
            temp: 0.0,
        }
    }
}

impl fmt::Display for CpuSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CpuSensor: name={}, id={:#x}, temp={}C",
            self.name, self.id, self.temp
        )
    }
}

/// A chassis fan and its last reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanSensor {
    pub name: String,
    pub id: u32,
    /// Current speed in RPM
    pub rpm: u32,
    /// Nominal maximum RPM
    pub max: u32,
}

impl FanSensor {
    pub fn key(&self) -> String {
        self.name.clone()
    }

    /// Current speed as a percentage of `max`, NaN when `max` is unknown.
    pub fn percent(&self) -> f64 {
        if self.max == 0 {
            return f64::NAN;
        }
        f64::from(self.rpm) / f64::from(self.max) * 100.0
    }

    /// Apply a fresh reading. Fields the BMC did not report keep their
    /// previous value.
    pub fn apply(&mut self, reading: &FanReading) {
        if let Some(rpm) = reading.rpm {
            self.rpm = rpm;
        } else {
            log::warn!("No RPM reading for {}, keeping {}", self.name, self.rpm);
        }
        if let Some(max) = reading.max {
            self.max = max;
        } else {
            log::warn!("No maximum for {}, keeping {}", self.name, self.max);
        }
    }
}

impl From<SensorId> for FanSensor {
    fn from(s: SensorId) -> Self {
        Self {
            name: s.name,
            id: s.id,
            rpm: 0,
            max: 0,
        }
    }
}

impl fmt::Display for FanSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FanSensor: name={}, id={:#x}, rpm={}, max={}, percent={:.1}%",
            self.name,
            self.id,
            self.rpm,
            self.max,
            self.percent()
        )
    }
}

/// One fan status read. `None` means the field was missing or malformed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanReading {
    pub rpm: Option<u32>,
    pub max: Option<u32>,
}

// ---------------------------------------------------------------------------
// Cached identities
// ---------------------------------------------------------------------------

/// Every sensor found by discovery, keyed for stable lookup across restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorIdentities {
    pub cpus: BTreeMap<String, CpuSensor>,
    pub fans: BTreeMap<String, FanSensor>,
}

impl SensorIdentities {
    pub fn from_discovery(cpus: Vec<SensorId>, fans: Vec<SensorId>) -> Self {
        let cpus = cpus
            .into_iter()
            .map(CpuSensor::from)
            .map(|c| (c.key(), c))
            .collect();
        let fans = fans
            .into_iter()
            .map(FanSensor::from)
            .map(|f| (f.key(), f))
            .collect();
        Self { cpus, fans }
    }

    pub fn cpu_ids(&self) -> Vec<SensorId> {
        self.cpus
            .values()
            .map(|c| SensorId::new(c.name.clone(), c.id))
            .collect()
    }

    pub fn fan_ids(&self) -> Vec<SensorId> {
        self.fans
            .values()
            .map(|f| SensorId::new(f.name.clone(), f.id))
            .collect()
    }

    /// Hottest CPU reading; the worst case governs cooling. `None` when no
    /// CPU sensors are known.
    pub fn max_cpu_temp(&self) -> Option<f64> {
        self.cpus.values().map(|c| c.temp).reduce(f64::max)
    }

    pub fn log_cpus(&self) {
        for cpu in self.cpus.values() {
            log::info!("{cpu}");
        }
    }

    pub fn log_fans(&self) {
        for fan in self.fans.values() {
            log::info!("{fan}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_max() {
        let fan = FanSensor {
            name: "Fan1".into(),
            id: 0x30,
            rpm: 2400,
            max: 9600,
        };
        assert_eq!(fan.percent(), 25.0);
    }

    #[test]
    fn test_percent_is_nan_without_max() {
        let fan = FanSensor::from(SensorId::new("Fan1", 0x30));
        assert!(fan.percent().is_nan());
    }

    #[test]
    fn test_partial_reading_keeps_last_known_values() {
        let mut fan = FanSensor {
            name: "Fan2".into(),
            id: 0x31,
            rpm: 3000,
            max: 12000,
        };
        fan.apply(&FanReading {
            rpm: None,
            max: Some(11000),
        });
        assert_eq!(fan.rpm, 3000);
        assert_eq!(fan.max, 11000);

        fan.apply(&FanReading {
            rpm: Some(4200),
            max: None,
        });
        assert_eq!(fan.rpm, 4200);
        assert_eq!(fan.max, 11000);
    }

    #[test]
    fn test_discovery_keys() {
        let ids = SensorIdentities::from_discovery(
            vec![SensorId::new("Temp", 0x0e), SensorId::new("Temp", 0x0f)],
            vec![SensorId::new("Fan1", 0x30)],
        );
        assert!(ids.cpus.contains_key("Temp (0xe)"));
        assert!(ids.cpus.contains_key("Temp (0xf)"));
        assert!(ids.fans.contains_key("Fan1"));
        assert_eq!(ids.cpu_ids().len(), 2);
    }

    #[test]
    fn test_max_cpu_temp() {
        let mut ids = SensorIdentities::from_discovery(
            vec![SensorId::new("Temp", 0x0e), SensorId::new("Temp", 0x0f)],
            vec![],
        );
        assert_eq!(ids.max_cpu_temp(), Some(0.0));
        for (i, cpu) in ids.cpus.values_mut().enumerate() {
            cpu.temp = 40.0 + i as f64 * 7.0;
        }
        assert_eq!(ids.max_cpu_temp(), Some(47.0));
        assert_eq!(SensorIdentities::default().max_cpu_temp(), None);
    }
}
