//! Core types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

/// World-space pose of a body or atom.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Transform {
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn at(position: Vec3) -> Self {
        Self::new(position, Quat::identity())
    }
}

// ---------------------------------------------------------------------------
// Proxy control modes
// ---------------------------------------------------------------------------

/// Position/rotation control state applied to every proxy by the bulk actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Position and rotation both held.
    On,
    /// Neither position nor rotation held.
    Off,
    RotationOnly,
    PositionOnly,
    /// Held with spring compliance instead of a hard lock.
    Comply,
}

impl ControlMode {
    pub fn all() -> [ControlMode; 5] {
        [
            ControlMode::On,
            ControlMode::Off,
            ControlMode::RotationOnly,
            ControlMode::PositionOnly,
            ControlMode::Comply,
        ]
    }
}

impl std::fmt::Display for ControlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ControlMode::On => "on",
            ControlMode::Off => "off",
            ControlMode::RotationOnly => "rotation only",
            ControlMode::PositionOnly => "position only",
            ControlMode::Comply => "comply",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Stats & config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkStats {
    /// Targets yielded by discovery right now.
    pub targets: usize,
    /// Proxies under this owner's scope that currently resolve.
    pub live_proxies: usize,
    /// Fixed joints on target bodies connected to their proxy.
    pub linked_joints: usize,
    /// Completed sync passes since init.
    pub completed_passes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Path below the owner's root where the asset's rigid bodies live.
    pub asset_subpath: String,
    /// Atom kind spawned for every proxy.
    pub proxy_kind: String,
    /// Ceiling for every readiness poll, in milliseconds.
    pub poll_timeout_ms: u64,
    /// Interval between readiness checks, in milliseconds.
    pub poll_interval_ms: u64,
    /// Uniform scale applied to the proxy marker while debug is on.
    pub marker_scale: f32,
    pub min_mass_scale: f32,
    pub max_mass_scale: f32,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            asset_subpath: "object/rescaleObject".into(),
            proxy_kind: "Sphere".into(),
            poll_timeout_ms: 3000,
            poll_interval_ms: 200,
            marker_scale: 0.05,
            min_mass_scale: 0.001,
            max_mass_scale: 10.0,
        }
    }
}
