//! Proxy lifecycle: create, reuse, repair, retire.
//!
//! Proxies are owned by the host's atom table. This module only ever holds
//! their uid and re-resolves it after every suspension point, because the
//! table can change under us while we wait on the host.

use crate::discovery::ControlTarget;
use crate::error::HostError;
use crate::host::{AtomRegistry, ProxySetup, RestoreFlag};
use crate::naming::{ControlId, ProxyHandle, ScopePrefix};
use crate::types::ControlMode;
use log::{debug, error, info, warn};

/// How [`ensure_proxy`] obtained its proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyOrigin {
    Reused,
    Created,
    /// A wrong-kind atom sat on the uid and was replaced.
    Repaired,
}

#[derive(Debug, Clone)]
pub struct EnsuredProxy {
    pub handle: ProxyHandle,
    pub origin: ProxyOrigin,
}

/// Parameters for the proxy of one target.
#[derive(Debug, Clone, Copy)]
pub struct ProxySpec<'a> {
    pub kind: &'a str,
    pub owner: &'a str,
    /// Mass the proxy should carry (target body mass times the mass scale).
    pub mass: f32,
}

impl ProxySpec<'_> {
    fn setup(&self) -> ProxySetup {
        ProxySetup {
            collisions: false,
            behaviours_enabled: false,
            mass: self.mass,
            drag: 0.0,
            angular_drag: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Ensure
// ---------------------------------------------------------------------------

/// Finds, repairs, or creates the proxy for `id`.
///
/// Returns `None` when the host could not produce a usable proxy; the target
/// stays unlinked until the next pass.
pub async fn ensure_proxy<R: AtomRegistry>(
    registry: &R,
    id: &ControlId,
    spec: ProxySpec<'_>,
) -> Option<EnsuredProxy> {
    let handle = ProxyHandle::new(id.clone());
    let mut origin = ProxyOrigin::Reused;

    if let Some(existing) = handle.resolve(registry) {
        if existing.kind == spec.kind {
            apply_setup(registry, &handle, spec);
            return Some(EnsuredProxy { handle, origin });
        }

        info!(
            "Proxy '{}' has kind '{}' instead of '{}'; replacing it",
            id, existing.kind, spec.kind
        );
        registry.remove_atom(id.as_str());
        registry.next_frame().await;
        origin = ProxyOrigin::Repaired;
    }

    if handle.resolve(registry).is_none() {
        match registry.create_atom(spec.kind, id.as_str()).await {
            Ok(()) => {
                if origin == ProxyOrigin::Reused {
                    origin = ProxyOrigin::Created;
                }
            }
            // Someone else (another pass, the host's loader) got there first.
            Err(HostError::UidInUse(_)) => debug!("Proxy '{}' appeared while creating it", id),
            Err(e) => {
                error!("Failed to create proxy '{}': {}", id, e);
                return None;
            }
        }
    }

    let Some(atom) = handle.resolve(registry) else {
        error!("Proxy '{}' does not exist after creation", id);
        return None;
    };
    if atom.kind != spec.kind {
        warn!(
            "Proxy '{}' still has kind '{}'; leaving it for the next pass",
            id, atom.kind
        );
        return None;
    }

    if origin != ProxyOrigin::Reused {
        if let Err(e) = registry.set_atom_parent(id.as_str(), spec.owner) {
            warn!("Could not parent proxy '{}' under '{}': {}", id, spec.owner, e);
        }
    }
    apply_setup(registry, &handle, spec);

    Some(EnsuredProxy { handle, origin })
}

fn apply_setup<R: AtomRegistry>(registry: &R, handle: &ProxyHandle, spec: ProxySpec<'_>) {
    if let Err(e) = registry.configure_proxy(handle.uid(), spec.setup()) {
        warn!("Could not configure proxy '{}': {}", handle.uid(), e);
    }
}

// ---------------------------------------------------------------------------
// Retire
// ---------------------------------------------------------------------------

/// Removes every atom under `prefix`. Does nothing while a restore is running.
///
/// Returns the number of atoms removed.
pub fn destroy_tracked_proxies<R: AtomRegistry>(
    registry: &R,
    prefix: &ScopePrefix,
    restore: RestoreFlag,
) -> usize {
    if restore.is_active() {
        debug!("Restore in progress; keeping proxies under '{}'", prefix);
        return 0;
    }

    let doomed: Vec<String> = registry
        .atom_uids()
        .into_iter()
        .filter(|uid| prefix.owns(uid))
        .collect();

    for uid in &doomed {
        info!("Removing proxy '{}'", uid);
        registry.remove_atom(uid);
    }
    doomed.len()
}

// ---------------------------------------------------------------------------
// Bulk control
// ---------------------------------------------------------------------------

/// Applies `mode` to the proxy of every target that currently resolves.
///
/// Returns how many proxies were switched.
pub fn apply_control_mode<R, I>(registry: &R, targets: I, mode: ControlMode) -> usize
where
    R: AtomRegistry,
    I: IntoIterator<Item = ControlTarget>,
{
    let mut switched = 0;
    for target in targets {
        let handle = ProxyHandle::new(target.control_id);
        if handle.resolve(registry).is_none() {
            debug!("No proxy '{}' to switch to {}", handle.id(), mode);
            continue;
        }
        match registry.set_control_mode(handle.uid(), mode) {
            Ok(()) => switched += 1,
            Err(e) => warn!("Could not set {} on '{}': {}", mode, handle.id(), e),
        }
    }
    switched
}
