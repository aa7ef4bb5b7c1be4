//! Joint synchronizer: positions one proxy and ties it to its body.

use crate::discovery::ControlTarget;
use crate::error::HostError;
use crate::host::{
    AssetGraph, JointId, JointInfo, JointKind, JointParams, Marker, RigidBodyRef, SceneHost,
};
use crate::naming::ScopePrefix;
use crate::proxy::{ensure_proxy, ProxyOrigin, ProxySpec};
use crate::types::Vec3;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Per-pass parameters shared by every [`sync_one`] call.
#[derive(Debug, Clone, Copy)]
pub struct SyncContext<'a> {
    pub owner: &'a str,
    pub proxy_kind: &'a str,
    pub mass_scale: f32,
    pub debug: bool,
    pub marker_scale: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    BodyMissing,
    ProxyUnavailable,
    ProxyVanished,
    Joint(HostError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::BodyMissing => f.write_str("target body not found"),
            SkipReason::ProxyUnavailable => f.write_str("proxy could not be created"),
            SkipReason::ProxyVanished => f.write_str("proxy disappeared mid-pass"),
            SkipReason::Joint(e) => write!(f, "joint update failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome {
    Linked {
        joint: JointId,
        proxy: ProxyOrigin,
        joint_created: bool,
    },
    Skipped(SkipReason),
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Brings one target to its linked state. Safe to repeat.
pub async fn sync_one<H: SceneHost>(
    host: &H,
    target: &ControlTarget,
    ctx: &SyncContext<'_>,
) -> TargetOutcome {
    let Some(body) = host.body_state(ctx.owner, &target.body) else {
        return skip(target, SkipReason::BodyMissing);
    };

    let spec = ProxySpec {
        kind: ctx.proxy_kind,
        owner: ctx.owner,
        mass: body.mass * ctx.mass_scale,
    };
    let Some(proxy) = ensure_proxy(host, &target.control_id, spec).await else {
        return skip(target, SkipReason::ProxyUnavailable);
    };

    // Anything may have changed while the proxy was being created.
    let Some(body) = host.body_state(ctx.owner, &target.body) else {
        return skip(target, SkipReason::BodyMissing);
    };
    let proxy_uid = proxy.handle.uid();

    if let Err(e) = host.set_atom_transform(proxy_uid, body.transform) {
        debug!("Positioning '{}' failed: {}", proxy_uid, e);
        return skip(target, SkipReason::ProxyVanished);
    }

    let (joint, joint_created) = match find_or_create_joint(host, ctx.owner, &target.body, proxy_uid) {
        Ok(found) => found,
        Err(HostError::BodyNotFound(_)) => return skip(target, SkipReason::BodyMissing),
        Err(e) => return skip(target, SkipReason::Joint(e)),
    };

    let params = JointParams {
        auto_configure_anchor: false,
        connected: proxy_uid.to_string(),
        connected_anchor: Vec3::zero(),
        connected_mass_scale: ctx.mass_scale,
    };
    if let Err(e) = host.configure_joint(ctx.owner, &target.body, joint, params) {
        return skip(target, SkipReason::Joint(e));
    }

    let marker = if ctx.debug {
        Marker {
            visible: true,
            scale: ctx.marker_scale,
        }
    } else {
        Marker {
            visible: false,
            scale: 1.0,
        }
    };
    if let Err(e) = host.set_marker(proxy_uid, marker) {
        warn!("Could not update marker of '{}': {}", proxy_uid, e);
    }

    debug!(
        "Linked '{}' -> '{}' (joint {}, proxy {:?})",
        target.body, proxy_uid, joint, proxy.origin
    );
    TargetOutcome::Linked {
        joint,
        proxy: proxy.origin,
        joint_created,
    }
}

fn skip(target: &ControlTarget, reason: SkipReason) -> TargetOutcome {
    warn!("Skipping target '{}': {}", target.body, reason);
    TargetOutcome::Skipped(reason)
}

// ---------------------------------------------------------------------------
// Joint reuse
// ---------------------------------------------------------------------------

/// Picks the fixed joint on a body that belongs to `proxy_uid`.
///
/// A joint already connected to the proxy wins over a free one, so a body
/// that somehow holds both never gains a second link.
pub fn find_link_joint(joints: &[JointInfo], proxy_uid: &str) -> Option<JointId> {
    let fixed = || joints.iter().filter(|j| j.kind == JointKind::Fixed);
    fixed()
        .find(|j| j.connected.as_deref() == Some(proxy_uid))
        .or_else(|| fixed().find(|j| j.connected.is_none()))
        .map(|j| j.id)
}

fn find_or_create_joint<H: SceneHost>(
    host: &H,
    owner: &str,
    body: &RigidBodyRef,
    proxy_uid: &str,
) -> Result<(JointId, bool), HostError> {
    let joints = host
        .joints_on(owner, body)
        .ok_or_else(|| HostError::BodyNotFound(body.name.clone()))?;

    match find_link_joint(&joints, proxy_uid) {
        Some(id) => Ok((id, false)),
        None => Ok((host.add_fixed_joint(owner, body)?, true)),
    }
}

/// Removes the fixed joints on `bodies` that tie them to a proxy under
/// `prefix`. Must run before the proxies go, while the joints still name them.
///
/// Returns the number of joints removed.
pub fn release_link_joints<A, I>(host: &A, owner: &str, bodies: I, prefix: &ScopePrefix) -> usize
where
    A: AssetGraph,
    I: IntoIterator<Item = RigidBodyRef>,
{
    let mut released = 0;
    for body in bodies {
        let Some(joints) = host.joints_on(owner, &body) else {
            continue;
        };
        let ours = joints.iter().filter(|j| {
            j.kind == JointKind::Fixed && j.connected.as_deref().is_some_and(|uid| prefix.owns(uid))
        });
        for joint in ours {
            match host.remove_joint(owner, &body, joint.id) {
                Ok(()) => {
                    debug!("Removed joint {} on '{}'", joint.id, body);
                    released += 1;
                }
                Err(e) => warn!("Could not remove joint {} on '{}': {}", joint.id, body, e),
            }
        }
    }
    released
}

// ---------------------------------------------------------------------------
// Debug overlay
// ---------------------------------------------------------------------------

/// One link line for the debug overlay: from the body to its proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLine {
    pub body: String,
    pub proxy: String,
    pub from: Vec3,
    pub to: Vec3,
}

pub fn link_line<H: SceneHost>(host: &H, owner: &str, target: &ControlTarget) -> Option<LinkLine> {
    let proxy_uid = target.control_id.as_str();
    let joints = host.joints_on(owner, &target.body)?;
    let linked = joints
        .iter()
        .any(|j| j.kind == JointKind::Fixed && j.connected.as_deref() == Some(proxy_uid));
    if !linked {
        return None;
    }

    let body = host.body_state(owner, &target.body)?;
    let proxy = host.atom_transform(proxy_uid)?;
    Some(LinkLine {
        body: target.body.name.clone(),
        proxy: proxy_uid.to_string(),
        from: body.transform.position,
        to: proxy.position,
    })
}
