//! Target discovery: which asset bodies should get a proxy this pass.

use crate::error::{LinkError, Result};
use crate::host::{AssetGraph, RigidBodyRef};
use crate::naming::{ControlId, ScopePrefix};
use log::debug;
use regex::Regex;

pub const MATCH_ALL: &str = ".*";

/// One (body, proxy id) pairing. Rebuilt every pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTarget {
    pub body: RigidBodyRef,
    pub control_id: ControlId,
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// User-editable body name filter.
///
/// A failed edit leaves the previously compiled pattern in force.
#[derive(Debug, Clone)]
pub struct TargetFilter {
    source: String,
    // None matches every name.
    compiled: Option<Regex>,
}

impl TargetFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            source: pattern.to_string(),
            compiled: compile(pattern)?,
        })
    }

    pub fn match_all() -> Self {
        Self {
            source: MATCH_ALL.to_string(),
            compiled: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Recompiles from `pattern`. Returns `Ok(false)` when the text did not
    /// change.
    pub fn set_pattern(&mut self, pattern: &str) -> Result<bool> {
        if pattern == self.source {
            return Ok(false);
        }
        self.compiled = compile(pattern)?;
        self.source = pattern.to_string();
        Ok(true)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.compiled.as_ref().map_or(true, |re| re.is_match(name))
    }
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>> {
    if pattern.is_empty() || pattern == MATCH_ALL {
        return Ok(None);
    }
    Regex::new(pattern).map(Some).map_err(|source| LinkError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Targets for `owner`'s asset, in the host's traversal order.
///
/// Empty while the asset subtree has not materialized; callers poll.
pub fn control_targets<'a, A: AssetGraph>(
    assets: &A,
    owner: &str,
    subpath: &str,
    prefix: &'a ScopePrefix,
    filter: &'a TargetFilter,
) -> impl Iterator<Item = ControlTarget> + 'a {
    let bodies = match assets.asset_bodies(owner, subpath) {
        Some(bodies) => bodies,
        None => {
            debug!("Asset subtree '{}' of '{}' not present yet", subpath, owner);
            Vec::new()
        }
    };

    bodies
        .into_iter()
        .filter(move |body| filter.matches(&body.name))
        .map(move |body| ControlTarget {
            control_id: prefix.control_id(&body),
            body,
        })
}
