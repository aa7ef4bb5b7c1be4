//! Control-atom linking
//!
//! Binds user-manipulable proxy atoms to the rigid bodies of an imported
//! asset, so that dragging a proxy drives the asset's physics hierarchy.
//!
//! ## Architecture
//!
//! ```text
//! Linker  (linker.rs)          ← reconciliation driver, load lifecycle
//!   ├── discovery.rs           ← which bodies get a proxy
//!   ├── joint.rs               ← position + find-or-create fixed joint
//!   │     └── proxy.rs         ← create / reuse / repair / retire proxies
//!   ├── naming.rs              ← scope prefix, control ids, proxy handles
//!   └── wait.rs                ← bounded readiness polling
//! host.rs                      ← AtomRegistry + AssetGraph seams
//! sim.rs                       ← MemoryScene host (feature `sim`)
//! ```
//!
//! All work is cooperative and single-threaded: every scene-mutating entry
//! point is an `async fn` awaiting the host, never a blocking call.

pub mod discovery;
pub mod error;
pub mod host;
pub mod joint;
pub mod linker;
pub mod naming;
pub mod proxy;
pub mod settings;
pub mod types;
pub mod wait;

#[cfg(feature = "sim")]
pub mod sim;

pub use discovery::{ControlTarget, TargetFilter};
pub use error::{HostError, LinkError, Result};
pub use host::{AssetGraph, AtomRegistry, RestoreFlag, RigidBodyRef, SceneHost};
pub use linker::{LinkPhase, Linker, LoadOrigin, SyncReport};
pub use naming::{ControlId, ProxyHandle, ScopePrefix};
pub use settings::LinkSettings;
#[cfg(feature = "sim")]
pub use sim::MemoryScene;
pub use types::{ControlMode, LinkStats, LinkerConfig, Quat, Transform, Vec3};
