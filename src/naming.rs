//! Deterministic proxy identities.
//!
//! A proxy's uid is `z$<owner>::<body>::Control`. The `z$<owner>::` part is the
//! owner's [`ScopePrefix`]; everything this crate creates lives under it, and
//! everything under it is considered reclaimable by that owner.

use crate::host::{AtomInfo, AtomRegistry, RigidBodyRef};
use serde::{Deserialize, Serialize};

const PREFIX_HEAD: &str = "z$";
const SCOPE_SEP: &str = "::";
const CONTROL_SUFFIX: &str = "::Control";

// ---------------------------------------------------------------------------
// Scope prefix
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopePrefix(String);

impl ScopePrefix {
    /// Builds the prefix for an owner uid.
    ///
    /// `:` and `%` in the uid are percent-escaped so that no owner's prefix
    /// can be a prefix of another owner's proxy uids (`A` vs `A::B`).
    pub fn for_owner(owner_uid: &str) -> Self {
        let mut escaped = String::with_capacity(owner_uid.len());
        for c in owner_uid.chars() {
            match c {
                '%' => escaped.push_str("%25"),
                ':' => escaped.push_str("%3A"),
                c => escaped.push(c),
            }
        }
        Self(format!("{PREFIX_HEAD}{escaped}{SCOPE_SEP}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owns(&self, uid: &str) -> bool {
        uid.starts_with(&self.0)
    }

    pub fn control_id(&self, body: &RigidBodyRef) -> ControlId {
        ControlId(format!("{}{}{CONTROL_SUFFIX}", self.0, body.name))
    }
}

impl std::fmt::Display for ScopePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The owner's uid plus a cached prefix that outlives it.
///
/// During teardown the host may already have cleared the owner uid, but the
/// destroy path still needs the prefix to find what to reclaim.
#[derive(Debug, Clone, Default)]
pub struct OwnerScope {
    uid: Option<String>,
    cached: Option<ScopePrefix>,
}

impl OwnerScope {
    pub fn new(uid: impl Into<String>) -> Self {
        let uid = uid.into();
        Self {
            cached: Some(ScopePrefix::for_owner(&uid)),
            uid: Some(uid),
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    /// Replaces the owner uid and derives its prefix.
    pub fn set_uid(&mut self, uid: impl Into<String>) {
        let uid = uid.into();
        self.cached = Some(ScopePrefix::for_owner(&uid));
        self.uid = Some(uid);
    }

    /// Forgets the uid but keeps the last derived prefix.
    pub fn detach(&mut self) {
        self.uid = None;
    }

    pub fn prefix(&self) -> Option<&ScopePrefix> {
        self.cached.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Control ids and proxy handles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId(String);

impl ControlId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ControlId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Weak, id-based reference to a proxy atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyHandle {
    id: ControlId,
}

impl ProxyHandle {
    pub fn new(id: ControlId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> &ControlId {
        &self.id
    }

    pub fn uid(&self) -> &str {
        self.id.as_str()
    }

    pub fn resolve<R: AtomRegistry>(&self, registry: &R) -> Option<AtomInfo> {
        registry.find_atom(self.id.as_str())
    }
}
