//! MemoryScene – an in-process scene host.
//!
//! Implements [`AtomRegistry`] and [`AssetGraph`] over plain maps so the linker
//! can run without an engine: the simulation binary uses it, and so does every
//! test. Creation is genuinely asynchronous (a yield or a timed delay), and a
//! create hook can mutate the scene between the request and its completion.

use crate::error::HostError;
use crate::host::{
    AssetGraph, AtomInfo, AtomRegistry, BodyState, JointId, JointInfo, JointKind, JointParams,
    Marker, ProxySetup, RigidBodyRef,
};
use crate::types::{ControlMode, Quat, Transform, Vec3};
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomRecord {
    pub uid: String,
    pub kind: String,
    pub parent: Option<String>,
    pub transform: Transform,
    pub setup: Option<ProxySetup>,
    pub marker: Option<Marker>,
    pub control_mode: Option<ControlMode>,
}

impl AtomRecord {
    fn new(uid: &str, kind: &str) -> Self {
        Self {
            uid: uid.to_string(),
            kind: kind.to_string(),
            parent: None,
            transform: Transform::default(),
            setup: None,
            marker: None,
            control_mode: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointRecord {
    pub id: JointId,
    pub kind: JointKind,
    pub connected: Option<String>,
    pub params: Option<JointParams>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub name: String,
    pub state: BodyState,
    pub joints: Vec<JointRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub subpath: String,
    pub bodies: Vec<BodyRecord>,
}

/// Mutable scene contents. Exposed to create hooks.
#[derive(Debug, Default)]
pub struct SceneState {
    pub atoms: BTreeMap<String, AtomRecord>,
    pub assets: HashMap<String, AssetRecord>,
    refused_kinds: HashSet<String>,
    next_joint: JointId,
}

impl SceneState {
    pub fn body_mut(&mut self, owner: &str, name: &str) -> Option<&mut BodyRecord> {
        self.assets
            .get_mut(owner)?
            .bodies
            .iter_mut()
            .find(|b| b.name == name)
    }

    pub fn remove_body(&mut self, owner: &str, name: &str) -> bool {
        let Some(asset) = self.assets.get_mut(owner) else {
            return false;
        };
        let before = asset.bodies.len();
        asset.bodies.retain(|b| b.name != name);
        asset.bodies.len() != before
    }

    pub fn remove_atom(&mut self, uid: &str) -> bool {
        if self.atoms.remove(uid).is_none() {
            return false;
        }
        // Joints lose their connected body along with the atom.
        for asset in self.assets.values_mut() {
            for body in &mut asset.bodies {
                for joint in &mut body.joints {
                    if joint.connected.as_deref() == Some(uid) {
                        joint.connected = None;
                    }
                }
            }
        }
        true
    }

    fn add_joint(&mut self, owner: &str, body: &str, kind: JointKind, connected: Option<String>) -> Option<JointId> {
        self.next_joint += 1;
        let id = self.next_joint;
        let body = self.body_mut(owner, body)?;
        body.joints.push(JointRecord {
            id,
            kind,
            connected,
            params: None,
        });
        Some(id)
    }
}

type CreateHook = Box<dyn FnMut(&mut SceneState, &str)>;

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryScene {
    state: Mutex<SceneState>,
    hooks: Mutex<Vec<CreateHook>>,
    creation_delay: Duration,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atom creation completes only after `delay` (on the tokio clock).
    pub fn with_creation_delay(delay: Duration) -> Self {
        Self {
            creation_delay: delay,
            ..Self::default()
        }
    }

    pub fn from_description(desc: &SceneDescription) -> Self {
        let scene = Self::with_creation_delay(Duration::from_millis(desc.creation_delay_ms));
        for asset in &desc.assets {
            scene.add_asset(
                &asset.owner,
                &asset.subpath,
                asset.bodies.iter().map(|b| {
                    (
                        b.name.clone(),
                        BodyState {
                            transform: Transform::new(b.position, b.rotation),
                            mass: b.mass,
                        },
                    )
                }),
            );
        }
        for atom in &desc.atoms {
            scene.add_atom(&atom.uid, &atom.kind);
        }
        scene
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    pub fn add_asset<I, S>(&self, owner: &str, subpath: &str, bodies: I)
    where
        I: IntoIterator<Item = (S, BodyState)>,
        S: Into<String>,
    {
        let bodies = bodies
            .into_iter()
            .map(|(name, state)| BodyRecord {
                name: name.into(),
                state,
                joints: Vec::new(),
            })
            .collect();
        self.state.lock().assets.insert(
            owner.to_string(),
            AssetRecord {
                subpath: subpath.to_string(),
                bodies,
            },
        );
    }

    pub fn remove_asset(&self, owner: &str) {
        self.state.lock().assets.remove(owner);
    }

    pub fn remove_body(&self, owner: &str, name: &str) -> bool {
        self.state.lock().remove_body(owner, name)
    }

    pub fn set_body_transform(&self, owner: &str, name: &str, transform: Transform) {
        if let Some(body) = self.state.lock().body_mut(owner, name) {
            body.state.transform = transform;
        }
    }

    pub fn add_atom(&self, uid: &str, kind: &str) {
        self.state
            .lock()
            .atoms
            .insert(uid.to_string(), AtomRecord::new(uid, kind));
    }

    /// Joint added by someone other than the linker.
    pub fn add_joint(&self, owner: &str, body: &str, kind: JointKind, connected: Option<&str>) -> Option<JointId> {
        self.state
            .lock()
            .add_joint(owner, body, kind, connected.map(str::to_string))
    }

    /// Creation requests for `kind` fail from now on.
    pub fn refuse_kind(&self, kind: &str) {
        self.state.lock().refused_kinds.insert(kind.to_string());
    }

    pub fn accept_kind(&self, kind: &str) {
        self.state.lock().refused_kinds.remove(kind);
    }

    /// Runs `hook` after every successful creation, before the creator resumes.
    pub fn on_create(&self, hook: impl FnMut(&mut SceneState, &str) + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub fn atom(&self, uid: &str) -> Option<AtomRecord> {
        self.state.lock().atoms.get(uid).cloned()
    }

    pub fn joints(&self, owner: &str, body: &str) -> Vec<JointRecord> {
        self.state
            .lock()
            .body_mut(owner, body)
            .map(|b| b.joints.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        let state = self.state.lock();
        let mut assets: Vec<_> = state
            .assets
            .iter()
            .map(|(owner, asset)| (owner.clone(), asset.clone()))
            .collect();
        assets.sort_by(|a, b| a.0.cmp(&b.0));
        SceneSnapshot {
            atoms: state.atoms.values().cloned().collect(),
            assets,
        }
    }

    fn with_atom<T>(&self, uid: &str, f: impl FnOnce(&mut AtomRecord) -> T) -> Result<T, HostError> {
        let mut state = self.state.lock();
        let atom = state
            .atoms
            .get_mut(uid)
            .ok_or_else(|| HostError::AtomNotFound(uid.to_string()))?;
        Ok(f(atom))
    }
}

// ---------------------------------------------------------------------------
// Host traits
// ---------------------------------------------------------------------------

impl AtomRegistry for MemoryScene {
    fn find_atom(&self, uid: &str) -> Option<AtomInfo> {
        self.state.lock().atoms.get(uid).map(|a| AtomInfo {
            uid: a.uid.clone(),
            kind: a.kind.clone(),
            parent: a.parent.clone(),
        })
    }

    async fn create_atom(&self, kind: &str, uid: &str) -> Result<(), HostError> {
        if self.creation_delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.creation_delay).await;
        }

        let mut hooks = self.hooks.lock();
        let mut state = self.state.lock();
        if state.refused_kinds.contains(kind) {
            return Err(HostError::CreationRefused {
                kind: kind.to_string(),
                uid: uid.to_string(),
            });
        }
        if state.atoms.contains_key(uid) {
            return Err(HostError::UidInUse(uid.to_string()));
        }

        debug!("Created atom '{}' ({})", uid, kind);
        state.atoms.insert(uid.to_string(), AtomRecord::new(uid, kind));
        for hook in hooks.iter_mut() {
            hook(&mut state, uid);
        }
        Ok(())
    }

    fn remove_atom(&self, uid: &str) {
        self.state.lock().remove_atom(uid);
    }

    fn atom_uids(&self) -> Vec<String> {
        self.state.lock().atoms.keys().cloned().collect()
    }

    fn set_atom_parent(&self, uid: &str, parent: &str) -> Result<(), HostError> {
        self.with_atom(uid, |a| a.parent = Some(parent.to_string()))
    }

    fn configure_proxy(&self, uid: &str, setup: ProxySetup) -> Result<(), HostError> {
        self.with_atom(uid, |a| a.setup = Some(setup))
    }

    fn set_atom_transform(&self, uid: &str, transform: Transform) -> Result<(), HostError> {
        self.with_atom(uid, |a| a.transform = transform)
    }

    fn atom_transform(&self, uid: &str) -> Option<Transform> {
        self.state.lock().atoms.get(uid).map(|a| a.transform)
    }

    fn set_marker(&self, uid: &str, marker: Marker) -> Result<(), HostError> {
        self.with_atom(uid, |a| a.marker = Some(marker))
    }

    fn set_control_mode(&self, uid: &str, mode: ControlMode) -> Result<(), HostError> {
        self.with_atom(uid, |a| a.control_mode = Some(mode))
    }
}

impl AssetGraph for MemoryScene {
    fn asset_bodies(&self, owner: &str, subpath: &str) -> Option<Vec<RigidBodyRef>> {
        let state = self.state.lock();
        let asset = state.assets.get(owner)?;
        if asset.subpath != subpath {
            return None;
        }
        Some(asset.bodies.iter().map(|b| RigidBodyRef::new(b.name.clone())).collect())
    }

    fn body_state(&self, owner: &str, body: &RigidBodyRef) -> Option<BodyState> {
        self.state.lock().body_mut(owner, &body.name).map(|b| b.state)
    }

    fn joints_on(&self, owner: &str, body: &RigidBodyRef) -> Option<Vec<JointInfo>> {
        let mut state = self.state.lock();
        let body = state.body_mut(owner, &body.name)?;
        Some(
            body.joints
                .iter()
                .map(|j| JointInfo {
                    id: j.id,
                    kind: j.kind,
                    connected: j.connected.clone(),
                })
                .collect(),
        )
    }

    fn add_fixed_joint(&self, owner: &str, body: &RigidBodyRef) -> Result<JointId, HostError> {
        self.state
            .lock()
            .add_joint(owner, &body.name, JointKind::Fixed, None)
            .ok_or_else(|| HostError::BodyNotFound(body.name.clone()))
    }

    fn configure_joint(
        &self,
        owner: &str,
        body: &RigidBodyRef,
        joint: JointId,
        params: JointParams,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if !state.atoms.contains_key(&params.connected) {
            return Err(HostError::AtomNotFound(params.connected));
        }
        let record = state
            .body_mut(owner, &body.name)
            .ok_or_else(|| HostError::BodyNotFound(body.name.clone()))?
            .joints
            .iter_mut()
            .find(|j| j.id == joint)
            .ok_or(HostError::JointNotFound(joint))?;
        record.connected = Some(params.connected.clone());
        record.params = Some(params);
        Ok(())
    }

    fn remove_joint(&self, owner: &str, body: &RigidBodyRef, joint: JointId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        let record = state
            .body_mut(owner, &body.name)
            .ok_or_else(|| HostError::BodyNotFound(body.name.clone()))?;
        let before = record.joints.len();
        record.joints.retain(|j| j.id != joint);
        if record.joints.len() == before {
            return Err(HostError::JointNotFound(joint));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scene files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDescription {
    pub name: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default = "default_mass")]
    pub mass: f32,
}

fn default_mass() -> f32 {
    1.0
}

fn default_subpath() -> String {
    crate::types::LinkerConfig::default().asset_subpath
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetDescription {
    pub owner: String,
    #[serde(default = "default_subpath")]
    pub subpath: String,
    pub bodies: Vec<BodyDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomDescription {
    pub uid: String,
    pub kind: String,
}

/// JSON scene file read by the simulation binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub assets: Vec<AssetDescription>,
    /// Atoms already present, e.g. proxies persisted by an earlier session.
    #[serde(default)]
    pub atoms: Vec<AtomDescription>,
    #[serde(default)]
    pub creation_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub atoms: Vec<AtomRecord>,
    pub assets: Vec<(String, AssetRecord)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(x: f32) -> BodyState {
        BodyState {
            transform: Transform::at(Vec3::new(x, 0.0, 0.0)),
            mass: 1.0,
        }
    }

    #[test]
    fn removing_atom_disconnects_its_joints() {
        let scene = MemoryScene::new();
        scene.add_asset("Owner", "object/rescaleObject", [("A", body(0.0))]);
        scene.add_atom("p", "Sphere");
        let id = scene.add_joint("Owner", "A", JointKind::Fixed, Some("p")).unwrap();

        scene.remove_atom("p");
        let joints = scene.joints("Owner", "A");
        assert_eq!(joints.len(), 1);
        assert_eq!(joints[0].id, id);
        assert_eq!(joints[0].connected, None);
    }

    #[test]
    fn removed_joint_is_gone_and_cannot_be_removed_twice() {
        let scene = MemoryScene::new();
        scene.add_asset("Owner", "object/rescaleObject", [("A", body(0.0))]);
        let keep = scene.add_joint("Owner", "A", JointKind::Hinge, None).unwrap();
        let drop = scene.add_joint("Owner", "A", JointKind::Fixed, None).unwrap();
        let a = RigidBodyRef::new("A");

        scene.remove_joint("Owner", &a, drop).unwrap();
        let ids: Vec<_> = scene.joints("Owner", "A").iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![keep]);
        assert_eq!(
            scene.remove_joint("Owner", &a, drop),
            Err(HostError::JointNotFound(drop))
        );
    }

    #[test]
    fn asset_lookup_requires_matching_subpath() {
        let scene = MemoryScene::new();
        scene.add_asset("Owner", "object/rescaleObject", [("A", body(0.0))]);
        assert!(scene.asset_bodies("Owner", "object").is_none());
        assert_eq!(
            scene.asset_bodies("Owner", "object/rescaleObject").unwrap(),
            vec![RigidBodyRef::new("A")]
        );
        assert!(scene.asset_bodies("Other", "object/rescaleObject").is_none());
    }

    #[test]
    fn create_rejects_taken_uid_and_refused_kind() {
        let scene = MemoryScene::new();
        scene.add_atom("p", "Sphere");
        scene.refuse_kind("Cube");

        let taken = tokio_test::block_on(scene.create_atom("Sphere", "p"));
        assert_eq!(taken, Err(HostError::UidInUse("p".into())));

        let refused = tokio_test::block_on(scene.create_atom("Cube", "q"));
        assert!(matches!(refused, Err(HostError::CreationRefused { .. })));
        assert!(scene.find_atom("q").is_none());
    }

    #[test]
    fn scene_description_parses_defaults() {
        let desc: SceneDescription = serde_json::from_str(
            r#"{ "assets": [ { "owner": "CUA", "bodies": [ { "name": "Hip" } ] } ] }"#,
        )
        .unwrap();
        let scene = MemoryScene::from_description(&desc);
        let state = scene
            .body_state("CUA", &RigidBodyRef::new("Hip"))
            .unwrap();
        assert_eq!(state.mass, 1.0);
        assert_eq!(state.transform.rotation, Quat::identity());
    }
}
