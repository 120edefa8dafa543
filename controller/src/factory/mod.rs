//! Authoritative entity factories.
//!
//! One factory per entity type, all sharing the same control flow:
//! check access on the relevant parent protection, take the write-side
//! lock of the uniqueness domain, re-check existence under that lock,
//! then either fail, return the existing instance, or allocate, build,
//! persist and register a new one. A single call never reports both
//! "created" and "pre-existing".
//!
//! Pooled numeric resources are allocated only after the existence
//! check, so a rejected call never leaks a port or minor number.

mod connection;
mod node;
mod resource;
mod snapshot;
mod stor_pool;

pub use connection::{NodeConnectionFactory, ResourceConnectionFactory, VolumeConnectionFactory};
pub use node::{NetInterfaceFactory, NodeFactory, SatelliteConnectionFactory};
pub use resource::{ResourceDefinitionFactory, ResourceFactory, VolumeDefinitionFactory, VolumeFactory};
pub use snapshot::{
    SnapshotDefinitionFactory, SnapshotFactory, SnapshotVolumeDefinitionFactory,
    SnapshotVolumeFactory,
};
pub use stor_pool::{StorPoolDefinitionFactory, StorPoolFactory};

use std::sync::Arc;

use quarry::QuarryError;

use crate::error::ControllerResult;

/// The shared get-or-create decision, evaluated while the caller holds
/// the write-side lock of the entity's uniqueness domain.
pub(crate) fn resolve<E>(
    kind: &'static str,
    existing: Option<Arc<E>>,
    create_if_not_exists: bool,
    fail_if_exists: bool,
    create: impl FnOnce() -> ControllerResult<Arc<E>>,
) -> ControllerResult<Option<Arc<E>>> {
    match existing {
        Some(found) => {
            if fail_if_exists {
                Err(QuarryError::AlreadyExists { kind }.into())
            } else {
                Ok(Some(found))
            }
        }
        None if create_if_not_exists => Ok(Some(create()?)),
        None => Ok(None),
    }
}
