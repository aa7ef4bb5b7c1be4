//! Linker – the reconciliation driver for one owning instance.
//!
//! ## Triggers
//!
//! | Entry point          | Effect                                              |
//! |----------------------|-----------------------------------------------------|
//! | [`Linker::init`]     | marks the load origin pending                       |
//! | [`Linker::tick`]     | resolves a pending origin as fresh: teardown + sync |
//! | `restore_from_json`  | applies persisted settings, origin = restored       |
//! | `complete_restore`   | waits for asset + proxies, then syncs               |
//! | `set_pattern`        | unlink dropped bodies, teardown + sync (if changed) |
//! | `set_debug`, `set_mass_scale` | sync                                       |
//! | [`Linker::rebuild`]  | teardown, one frame, sync                           |
//! | [`Linker::on_destroy`] | unlink every body, teardown                       |
//! | `set_owner_uid`      | retires the old prefix once no restore is running   |
//!
//! Every entry point that can mutate the scene takes the host's
//! [`RestoreFlag`]; while it is set, syncs and teardowns are no-ops.

use crate::discovery::{control_targets, ControlTarget, TargetFilter};
use crate::error::Result;
use crate::host::{JointKind, RestoreFlag, SceneHost};
use crate::joint::{
    link_line, release_link_joints, sync_one, LinkLine, SkipReason, SyncContext, TargetOutcome,
};
use crate::naming::{ControlId, OwnerScope, ScopePrefix};
use crate::proxy::{apply_control_mode, destroy_tracked_proxies, ProxyOrigin};
use crate::settings::{clamp_mass_scale, LinkSettings};
use crate::types::{ControlMode, LinkStats, LinkerConfig};
use crate::wait::{poll_until, PollPolicy, WaitOutcome};
use log::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Syncing,
    RestoringFromLoad,
}

/// Whether the current session started from a saved scene or from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
    /// `init` has not run yet.
    Uninitialized,
    /// `init` ran; no restore signal has been seen so far.
    Pending,
    Restored,
    /// No restore arrived before the first tick: proxies from an earlier
    /// session may linger and were torn down.
    Fresh,
}

/// Everything one sync pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Pass number, 0 when the pass did not run.
    pub pass: u64,
    pub linked: Vec<ControlId>,
    pub skipped: Vec<(ControlId, SkipReason)>,
    pub proxies_created: usize,
    pub proxies_repaired: usize,
    pub joints_created: usize,
    /// Proxies removed by a teardown that preceded this pass.
    pub proxies_removed: usize,
    /// Joints removed from bodies that are no longer targets.
    pub joints_removed: usize,
    /// The pass did not run because a restore was in progress.
    pub suppressed: bool,
}

impl SyncReport {
    fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Default::default()
        }
    }
}

pub struct Linker {
    config: LinkerConfig,
    scope: OwnerScope,
    filter: TargetFilter,
    settings: LinkSettings,
    phase: LinkPhase,
    origin: LoadOrigin,
    completed_passes: u64,
    /// Prefixes of earlier owner uids whose proxies still await removal.
    retired: Vec<ScopePrefix>,
}

impl Linker {
    pub fn new(config: LinkerConfig, owner_uid: impl Into<String>) -> Self {
        Self {
            config,
            scope: OwnerScope::new(owner_uid),
            filter: TargetFilter::default(),
            settings: LinkSettings::default(),
            phase: LinkPhase::Idle,
            origin: LoadOrigin::Uninitialized,
            completed_passes: 0,
            retired: Vec::new(),
        }
    }

    /// Builds a linker with non-default settings. Fails on a bad pattern.
    pub fn with_settings(
        config: LinkerConfig,
        owner_uid: impl Into<String>,
        settings: LinkSettings,
    ) -> Result<Self> {
        let mut linker = Self::new(config, owner_uid);
        linker.filter = TargetFilter::new(&settings.pattern)?;
        let (min, max) = (linker.config.min_mass_scale, linker.config.max_mass_scale);
        linker.settings = settings.clamped(min, max);
        Ok(linker)
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn load_origin(&self) -> LoadOrigin {
        self.origin
    }

    pub fn completed_passes(&self) -> u64 {
        self.completed_passes
    }

    pub fn prefix(&self) -> Option<ScopePrefix> {
        self.scope.prefix().cloned()
    }

    pub fn owner_uid(&self) -> Option<&str> {
        self.scope.uid()
    }

    /// The owner atom was renamed. Proxies under the old prefix no longer
    /// match anything and are retired; returns how many were removed.
    ///
    /// While a restore is running the old prefix is remembered and reclaimed
    /// by the next sync or teardown.
    pub fn set_owner_uid<H: SceneHost>(
        &mut self,
        host: &H,
        uid: impl Into<String>,
        restore: RestoreFlag,
    ) -> usize {
        let old = self.scope.prefix().cloned();
        self.scope.set_uid(uid);
        let current = self.scope.prefix().cloned();
        if let Some(old) = old {
            if !self.retired.contains(&old) {
                self.retired.push(old);
            }
        }
        self.retired.retain(|p| Some(p) != current.as_ref());
        self.reclaim_retired(host, restore)
    }

    fn reclaim_retired<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> usize {
        if restore.is_active() || self.retired.is_empty() {
            return 0;
        }

        let bodies = self.scope.uid().and_then(|owner| {
            host.asset_bodies(owner, &self.config.asset_subpath)
                .map(|bodies| (owner, bodies))
        });
        let mut removed = 0;
        for prefix in std::mem::take(&mut self.retired) {
            if let Some((owner, bodies)) = &bodies {
                release_link_joints(host, owner, bodies.iter().cloned(), &prefix);
            }
            info!("Reclaiming proxies of former scope '{}'", prefix);
            removed += destroy_tracked_proxies(host, &prefix, restore);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Load lifecycle
    // -----------------------------------------------------------------------

    pub fn init(&mut self) {
        info!("Linker init for '{}'", self.scope.uid().unwrap_or("<detached>"));
        if self.origin == LoadOrigin::Uninitialized {
            self.origin = LoadOrigin::Pending;
        }
    }

    /// Called once per host frame. Resolves a pending load origin.
    ///
    /// A restore flag that is up while the origin is still pending means the
    /// host is mid-load and simply has not delivered our payload yet, so the
    /// decision is deferred to a later tick.
    pub async fn tick<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> Option<SyncReport> {
        if self.origin != LoadOrigin::Pending || restore.is_active() {
            return None;
        }

        info!("No restore signal after init; treating as a fresh load");
        self.origin = LoadOrigin::Fresh;
        let removed = self.teardown(host, restore).await;
        if let Some(owner) = self.scope.uid().map(str::to_string) {
            self.wait_for_asset(host, &owner).await;
        }
        let mut report = self.sync(host, restore).await;
        report.proxies_removed += removed;
        Some(report)
    }

    /// Applies settings from a persisted blob. Runs while the host's restore
    /// flag is set, so nothing touches the scene here.
    pub fn restore_from_json(&mut self, payload: &serde_json::Value) -> Result<()> {
        self.origin = LoadOrigin::Restored;

        let restored = LinkSettings::from_json(payload)?
            .clamped(self.config.min_mass_scale, self.config.max_mass_scale);

        if let Err(e) = self.filter.set_pattern(&restored.pattern) {
            error!("{}", e);
            self.settings.debug = restored.debug;
            self.settings.mass_scale = restored.mass_scale;
            return Err(e);
        }
        self.settings = restored;
        debug!("Restored settings {:?}", self.settings);
        Ok(())
    }

    pub fn persisted_state(&self) -> Result<serde_json::Value> {
        self.settings.to_json()
    }

    /// The host finished loading. Waits (bounded) for the asset bodies and
    /// then for every expected proxy, then runs one pass.
    pub async fn complete_restore<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> SyncReport {
        let Some(owner) = self.scope.uid().map(str::to_string) else {
            error!("Restore completed for a detached linker");
            return SyncReport::default();
        };
        let Some(prefix) = self.prefix() else {
            return SyncReport::default();
        };

        self.phase = LinkPhase::RestoringFromLoad;
        let policy = PollPolicy::from_config(&self.config);
        self.wait_for_asset(host, &owner).await;

        let expected: Vec<ControlTarget> =
            control_targets(host, &owner, &self.config.asset_subpath, &prefix, &self.filter)
                .collect();
        let proxies = poll_until(policy, || {
            expected
                .iter()
                .all(|t| host.find_atom(t.control_id.as_str()).is_some())
        })
        .await;
        if !proxies.is_ready() {
            warn!(
                "Not every restored proxy of '{}' resolved after {:?}; syncing anyway",
                owner, policy.timeout
            );
        }

        self.phase = LinkPhase::Idle;
        self.sync(host, restore).await
    }

    /// Bounded wait for the owner's asset bodies to show up.
    async fn wait_for_asset<H: SceneHost>(&self, host: &H, owner: &str) -> WaitOutcome {
        let policy = PollPolicy::from_config(&self.config);
        let subpath = &self.config.asset_subpath;
        let outcome = poll_until(policy, || {
            host.asset_bodies(owner, subpath)
                .map_or(false, |bodies| !bodies.is_empty())
        })
        .await;
        if !outcome.is_ready() {
            warn!("Asset of '{}' still empty after {:?}; syncing anyway", owner, policy.timeout);
        }
        outcome
    }

    /// Owner is going away: unlink its bodies and remove everything under its
    /// prefix.
    pub fn on_destroy<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> usize {
        let mut removed = self.reclaim_retired(host, restore);
        if !restore.is_active() {
            if let (Some(owner), Some(prefix)) = (self.scope.uid(), self.scope.prefix()) {
                if let Some(bodies) = host.asset_bodies(owner, &self.config.asset_subpath) {
                    let released = release_link_joints(host, owner, bodies, prefix);
                    debug!("Released {} joints of '{}'", released, owner);
                }
            }
        }
        if let Some(prefix) = self.scope.prefix() {
            removed += destroy_tracked_proxies(host, prefix, restore);
        }
        self.scope.detach();
        removed
    }

    // -----------------------------------------------------------------------
    // User actions
    // -----------------------------------------------------------------------

    /// Edits the target pattern. A malformed pattern is reported and the old
    /// one stays active; an unchanged pattern does nothing.
    pub async fn set_pattern<H: SceneHost>(
        &mut self,
        host: &H,
        pattern: &str,
        restore: RestoreFlag,
    ) -> Result<Option<SyncReport>> {
        match self.filter.set_pattern(pattern) {
            Ok(false) => Ok(None),
            Ok(true) => {
                self.settings.pattern = pattern.to_string();
                let released = self.release_unmatched_joints(host, restore);
                let mut report = self.teardown_and_sync(host, restore).await;
                report.joints_removed = released;
                Ok(Some(report))
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    pub async fn set_debug<H: SceneHost>(&mut self, host: &H, debug: bool, restore: RestoreFlag) -> SyncReport {
        self.settings.debug = debug;
        self.sync(host, restore).await
    }

    pub async fn set_mass_scale<H: SceneHost>(
        &mut self,
        host: &H,
        mass_scale: f32,
        restore: RestoreFlag,
    ) -> SyncReport {
        self.settings.mass_scale =
            clamp_mass_scale(mass_scale, self.config.min_mass_scale, self.config.max_mass_scale);
        self.sync(host, restore).await
    }

    pub async fn rebuild<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> SyncReport {
        info!("Rebuild requested");
        self.teardown_and_sync(host, restore).await
    }

    /// Switches every current target's proxy to `mode`.
    pub fn apply_control_mode<H: SceneHost>(&self, host: &H, mode: ControlMode) -> usize {
        let targets = self.targets(host);
        let switched = apply_control_mode(host, targets, mode);
        info!("Set {} proxies to {}", switched, mode);
        switched
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Drops the joints that tie bodies outside the current filter to our
    /// proxies. Bodies that still match keep theirs for reuse.
    fn release_unmatched_joints<H: SceneHost>(&self, host: &H, restore: RestoreFlag) -> usize {
        if restore.is_active() {
            return 0;
        }
        let (Some(owner), Some(prefix)) = (self.scope.uid(), self.scope.prefix()) else {
            return 0;
        };
        let Some(bodies) = host.asset_bodies(owner, &self.config.asset_subpath) else {
            return 0;
        };
        let unmatched = bodies.into_iter().filter(|b| !self.filter.matches(&b.name));
        release_link_joints(host, owner, unmatched, prefix)
    }

    /// Removes every proxy under the current prefix and lets one frame pass.
    async fn teardown<H: SceneHost>(&self, host: &H, restore: RestoreFlag) -> usize {
        let removed = match self.scope.prefix() {
            Some(prefix) => destroy_tracked_proxies(host, prefix, restore),
            None => 0,
        };
        if removed > 0 {
            // Let the host flush its destroy queue before recreating the uids.
            host.next_frame().await;
        }
        removed
    }

    async fn teardown_and_sync<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> SyncReport {
        if restore.is_active() {
            return SyncReport::suppressed();
        }

        let removed = self.teardown(host, restore).await;
        let mut report = self.sync(host, restore).await;
        report.proxies_removed += removed;
        report
    }

    /// One full reconciliation pass.
    pub async fn sync<H: SceneHost>(&mut self, host: &H, restore: RestoreFlag) -> SyncReport {
        if restore.is_active() {
            debug!("Restore in progress; sync suppressed");
            return SyncReport::suppressed();
        }
        let Some(owner) = self.scope.uid().map(str::to_string) else {
            error!("Sync requested but no owner uid is set");
            return SyncReport::default();
        };

        let reclaimed = self.reclaim_retired(host, restore);
        if reclaimed > 0 {
            host.next_frame().await;
        }

        self.phase = LinkPhase::Syncing;
        let targets = self.targets(host);
        let ctx = SyncContext {
            owner: &owner,
            proxy_kind: &self.config.proxy_kind,
            mass_scale: self.settings.mass_scale,
            debug: self.settings.debug,
            marker_scale: self.config.marker_scale,
        };

        let mut report = SyncReport {
            pass: self.completed_passes + 1,
            proxies_removed: reclaimed,
            ..Default::default()
        };
        for target in &targets {
            match sync_one(host, target, &ctx).await {
                TargetOutcome::Linked {
                    proxy,
                    joint_created,
                    ..
                } => {
                    match proxy {
                        ProxyOrigin::Created => report.proxies_created += 1,
                        ProxyOrigin::Repaired => report.proxies_repaired += 1,
                        ProxyOrigin::Reused => {}
                    }
                    if joint_created {
                        report.joints_created += 1;
                    }
                    report.linked.push(target.control_id.clone());
                }
                TargetOutcome::Skipped(reason) => {
                    report.skipped.push((target.control_id.clone(), reason));
                }
            }
        }

        self.completed_passes += 1;
        self.phase = LinkPhase::Idle;
        info!(
            "Sync pass {} for '{}': {} linked, {} skipped",
            report.pass,
            owner,
            report.linked.len(),
            report.skipped.len()
        );
        report
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current targets, freshly discovered.
    pub fn targets<H: SceneHost>(&self, host: &H) -> Vec<ControlTarget> {
        let (Some(owner), Some(prefix)) = (self.scope.uid(), self.scope.prefix()) else {
            return Vec::new();
        };
        control_targets(host, owner, &self.config.asset_subpath, prefix, &self.filter).collect()
    }

    /// Link lines for the debug overlay; empty while debug is off.
    pub fn debug_links<H: SceneHost>(&self, host: &H) -> Vec<LinkLine> {
        if !self.settings.debug {
            return Vec::new();
        }
        let Some(owner) = self.scope.uid() else {
            return Vec::new();
        };
        self.targets(host)
            .iter()
            .filter_map(|t| link_line(host, owner, t))
            .collect()
    }

    pub fn stats<H: SceneHost>(&self, host: &H) -> LinkStats {
        let owner = self.scope.uid();
        let targets = self.targets(host);
        let live_proxies = match self.scope.prefix() {
            Some(prefix) => host.atom_uids().iter().filter(|uid| prefix.owns(uid)).count(),
            None => 0,
        };
        let linked_joints = owner.map_or(0, |owner| {
            targets
                .iter()
                .filter(|t| link_line_exists(host, owner, t))
                .count()
        });

        LinkStats {
            targets: targets.len(),
            live_proxies,
            linked_joints,
            completed_passes: self.completed_passes,
        }
    }
}

fn link_line_exists<H: SceneHost>(host: &H, owner: &str, target: &ControlTarget) -> bool {
    host.joints_on(owner, &target.body).map_or(false, |joints| {
        joints
            .iter()
            .any(|j| j.kind == JointKind::Fixed && j.connected.as_deref() == Some(target.control_id.as_str()))
    })
}
