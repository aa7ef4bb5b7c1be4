//! User-facing settings and their persisted form.
//!
//! The host stores these in its generic key/value config blob; the keys below
//! are what ends up in a saved scene, so they must not change.
//!
//! | Key                | Type   | Default |
//! |--------------------|--------|---------|
//! | `target nodes re`  | string | `.*`    |
//! | `Debug`            | bool   | `false` |
//! | `mass scale`       | float  | `0.1`   |

use crate::discovery::MATCH_ALL;
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MASS_SCALE: f32 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    #[serde(rename = "target nodes re")]
    pub pattern: String,
    #[serde(rename = "Debug")]
    pub debug: bool,
    #[serde(rename = "mass scale")]
    pub mass_scale: f32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            pattern: MATCH_ALL.to_string(),
            debug: false,
            mass_scale: DEFAULT_MASS_SCALE,
        }
    }
}

impl LinkSettings {
    /// Reads a persisted blob. Missing keys fall back to defaults; unrelated
    /// keys written by other storables are ignored.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Clamps the mass scale into `[min, max]`; non-finite values reset to the
    /// default.
    pub fn clamped(mut self, min: f32, max: f32) -> Self {
        self.mass_scale = clamp_mass_scale(self.mass_scale, min, max);
        self
    }
}

pub fn clamp_mass_scale(value: f32, min: f32, max: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        DEFAULT_MASS_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn persisted_keys_match_host_names() {
        let settings = LinkSettings {
            pattern: "^H".into(),
            debug: true,
            mass_scale: 0.2,
        };
        let value = settings.to_json().unwrap();
        assert_eq!(value["target nodes re"], json!("^H"));
        assert_eq!(value["Debug"], json!(true));
        assert!((value["mass scale"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn missing_keys_use_defaults() {
        let settings = LinkSettings::from_json(&json!({
            "id": "plugin#0_CUAControllers",
            "Debug": true,
        }))
        .unwrap();
        assert_eq!(settings.pattern, ".*");
        assert!(settings.debug);
        assert_eq!(settings.mass_scale, DEFAULT_MASS_SCALE);
    }

    #[test]
    fn wrongly_typed_value_is_rejected() {
        assert!(LinkSettings::from_json(&json!({ "Debug": "yes" })).is_err());
    }

    #[test]
    fn mass_scale_is_clamped() {
        let s = LinkSettings {
            mass_scale: 50.0,
            ..Default::default()
        };
        assert_eq!(s.clamped(0.001, 10.0).mass_scale, 10.0);
        assert_eq!(clamp_mass_scale(0.0, 0.001, 10.0), 0.001);
        assert_eq!(clamp_mass_scale(f32::NAN, 0.001, 10.0), DEFAULT_MASS_SCALE);
    }
}
