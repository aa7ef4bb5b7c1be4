//! Host collaborator seams.
//!
//! Everything this crate touches in the scene goes through two traits:
//!
//! | Trait           | Covers                                              |
//! |-----------------|-----------------------------------------------------|
//! | [`AtomRegistry`]| global atom table: lookup, async create, remove     |
//! | [`AssetGraph`]  | the owner's imported asset: bodies and their joints |
//!
//! Handles crossing these seams are plain identifiers. Nothing here hands out
//! references into host storage, since the host can invalidate or recreate any
//! object between two calls.

use crate::error::HostError;
use crate::types::{ControlMode, Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::future::Future;

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A rigid body inside the owner's asset, identified by its local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RigidBodyRef {
    pub name: String,
}

impl RigidBodyRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for RigidBodyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomInfo {
    pub uid: String,
    pub kind: String,
    pub parent: Option<String>,
}

/// Live physical state of a body, read fresh on every use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub transform: Transform,
    pub mass: f32,
}

pub type JointId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    Fixed,
    Hinge,
    Configurable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointInfo {
    pub id: JointId,
    pub kind: JointKind,
    /// Uid of the atom whose root body is on the other end, if any.
    pub connected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointParams {
    pub auto_configure_anchor: bool,
    pub connected: String,
    pub connected_anchor: Vec3,
    pub connected_mass_scale: f32,
}

/// Physical setup applied once to a freshly created proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProxySetup {
    pub collisions: bool,
    pub behaviours_enabled: bool,
    pub mass: f32,
    pub drag: f32,
    pub angular_drag: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub visible: bool,
    pub scale: f32,
}

/// Host-driven "persisted state is being loaded" signal.
///
/// Read, never written, by this crate; every driver entry point takes it as a
/// parameter instead of consulting ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreFlag(pub bool);

impl RestoreFlag {
    pub const IDLE: RestoreFlag = RestoreFlag(false);
    pub const ACTIVE: RestoreFlag = RestoreFlag(true);

    pub fn is_active(self) -> bool {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The scene's global atom table.
pub trait AtomRegistry {
    fn find_atom(&self, uid: &str) -> Option<AtomInfo>;

    /// Ask the host to create an atom. Completes once the atom exists (or the
    /// host gave up); callers must re-resolve by uid afterwards.
    fn create_atom(&self, kind: &str, uid: &str) -> impl Future<Output = Result<(), HostError>>;

    fn remove_atom(&self, uid: &str);

    fn atom_uids(&self) -> Vec<String>;

    fn set_atom_parent(&self, uid: &str, parent: &str) -> Result<(), HostError>;

    fn configure_proxy(&self, uid: &str, setup: ProxySetup) -> Result<(), HostError>;

    fn set_atom_transform(&self, uid: &str, transform: Transform) -> Result<(), HostError>;

    fn atom_transform(&self, uid: &str) -> Option<Transform>;

    fn set_marker(&self, uid: &str, marker: Marker) -> Result<(), HostError>;

    fn set_control_mode(&self, uid: &str, mode: ControlMode) -> Result<(), HostError>;

    /// Yield until the host's next scheduling frame.
    fn next_frame(&self) -> impl Future<Output = ()> {
        tokio::task::yield_now()
    }
}

/// The imported asset owned by an atom.
pub trait AssetGraph {
    /// Rigid bodies beneath `subpath` of `owner`'s asset, in traversal order.
    /// `None` while the subtree is not materialized.
    fn asset_bodies(&self, owner: &str, subpath: &str) -> Option<Vec<RigidBodyRef>>;

    fn body_state(&self, owner: &str, body: &RigidBodyRef) -> Option<BodyState>;

    fn joints_on(&self, owner: &str, body: &RigidBodyRef) -> Option<Vec<JointInfo>>;

    fn add_fixed_joint(&self, owner: &str, body: &RigidBodyRef) -> Result<JointId, HostError>;

    fn configure_joint(
        &self,
        owner: &str,
        body: &RigidBodyRef,
        joint: JointId,
        params: JointParams,
    ) -> Result<(), HostError>;

    fn remove_joint(&self, owner: &str, body: &RigidBodyRef, joint: JointId) -> Result<(), HostError>;
}

/// Convenience bound for everything the linker needs from the host.
pub trait SceneHost: AtomRegistry + AssetGraph {}

impl<T: AtomRegistry + AssetGraph> SceneHost for T {}
