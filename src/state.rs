// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Controller state persisted between polls and across restarts.
//!
//! The state file is JSON and is replaced atomically on every save, so a
//! crash never leaves a half-written file behind.

use crate::error::{FanctlError, Result};
use crate::sensor::SensorIdentities;
use crate::window::AggregationWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE_PREFIX: &str = "fanctl_";
const STATE_FILE_EXT: &str = "json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub window: AggregationWindow,
    /// Sensors found by discovery. `None` until discovery succeeds.
    #[serde(default)]
    pub sensors: Option<SensorIdentities>,
}

impl ControllerState {
    /// Fresh state with no samples and no discovered sensors.
    pub fn new(sample_size: usize) -> Self {
        Self {
            window: AggregationWindow::new(sample_size),
            sensors: None,
        }
    }

    /// Feed a CPU reading into the rolling average.
    pub fn add_sample(&mut self, value: f64, now: DateTime<Utc>) -> f64 {
        self.window.add_sample(value, now)
    }

    pub fn set_sample_size(&mut self, sample_size: usize) {
        self.window.set_sample_size(sample_size);
    }

    /// Load state from `path`, or start fresh if there is none. The runtime
    /// `sample_size` always replaces the stored one.
    pub fn load(path: &Path, sample_size: usize) -> Result<Self> {
        if !path.exists() {
            log::info!("No state file at {}, starting fresh", path.display());
            return Ok(Self::new(sample_size));
        }

        let contents = fs::read(path).map_err(|e| FanctlError::io(path, e))?;
        let mut state: Self =
            serde_json::from_slice(&contents).map_err(|source| FanctlError::StateCorrupt {
                path: path.to_path_buf(),
                source,
            })?;
        state.set_sample_size(sample_size);

        log::info!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Write the full state to `path`, replacing any previous contents.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FanctlError::io(parent, e))?;
        }

        let contents = serde_json::to_vec_pretty(self).map_err(|e| {
            FanctlError::Parse(format!("Failed to serialize controller state: {e}"))
        })?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, contents).map_err(|e| FanctlError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| FanctlError::io(path, e))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State file naming
// ---------------------------------------------------------------------------

/// Filesystem-safe form of a controller identity: lowercase, runs of
/// anything but ASCII letters and digits collapsed to `-`, trimmed.
pub fn slugify(identity: &str) -> String {
    let mut slug = String::with_capacity(identity.len());
    let mut pending_sep = false;

    for c in identity.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('-');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}

/// Path of the state file for a controller identity.
pub fn state_file_path(state_dir: &Path, identity: &str) -> PathBuf {
    state_dir.join(format!(
        "{STATE_FILE_PREFIX}{}.{STATE_FILE_EXT}",
        slugify(identity)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{FanReading, SensorId};
    use chrono::{TimeDelta, TimeZone};
    use tempfile::TempDir;

    fn populated_state() -> ControllerState {
        let mut state = ControllerState::new(3);
        let t0 = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap();
        state.add_sample(51.5, t0);
        state.add_sample(53.25, t0 + TimeDelta::seconds(10));

        let mut ids = SensorIdentities::from_discovery(
            vec![SensorId::new("Temp", 0x0e), SensorId::new("Temp", 0x0f)],
            vec![SensorId::new("Fan1", 0x30), SensorId::new("Fan2", 0x31)],
        );
        for fan in ids.fans.values_mut() {
            fan.apply(&FanReading {
                rpm: Some(3360),
                max: Some(16800),
            });
        }
        state.sensors = Some(ids);
        state
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("iDRAC.Lab-01"), "idrac-lab-01");
        assert_eq!(slugify("  Rack 4 / R720xd  "), "rack-4-r720xd");
        assert_eq!(slugify("10.0.0.12"), "10-0-0-12");
        assert_eq!(slugify("---"), "default");
    }

    #[test]
    fn test_state_file_path() {
        let path = state_file_path(Path::new("/var/tmp"), "R720 Storage");
        assert_eq!(path, PathBuf::from("/var/tmp/fanctl_r720-storage.json"));
    }

    #[test]
    fn test_load_missing_gives_fresh_state() {
        let dir = TempDir::new().unwrap();
        let state = ControllerState::load(&dir.path().join("none.json"), 4).unwrap();
        assert_eq!(state.window.sample_size(), 4);
        assert!(state.window.samples().is_empty());
        assert_eq!(state.window.last_sample_time(), None);
        assert!(state.sensors.is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let state = populated_state();

        state.save(&path).unwrap();
        let first = ControllerState::load(&path, 3).unwrap();
        assert_eq!(first, state);

        first.save(&path).unwrap();
        let second = ControllerState::load(&path, 3).unwrap();
        assert_eq!(second, first);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_load_applies_runtime_sample_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let mut state = ControllerState::new(5);
        let t0 = Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap();
        for i in 0..5 {
            state.add_sample(40.0 + f64::from(i), t0 + TimeDelta::seconds(i64::from(i)));
        }
        state.save(&path).unwrap();

        let loaded = ControllerState::load(&path, 2).unwrap();
        assert_eq!(loaded.window.sample_size(), 2);
        assert_eq!(loaded.window.samples(), &[43.0, 44.0]);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"\x80\x03cpickle\n").unwrap();

        let err = ControllerState::load(&path, 3).unwrap_err();
        assert!(matches!(err, FanctlError::StateCorrupt { .. }));
        assert!(err.is_fatal());
        // The bad file is left in place for the operator.
        assert!(path.exists());
    }

    #[test]
    fn test_save_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let path = state_file_path(&dir.path().join("a").join("b"), "host");
        ControllerState::new(3).save(&path).unwrap();
        assert!(path.exists());
    }
}
