//! Mirror construction paths.
//!
//! One mirror per entity type, all sharing the same control flow: look
//! the entity up in memory by its natural key; when present, verify the
//! controller-pushed UUID against the held instance and return it
//! unchanged; when absent, construct it from the pushed UUID and
//! attributes and register it. Replayed and out-of-order pushes are
//! therefore harmless. A UUID that disagrees means the satellite's
//! mirror has diverged from the controller, which only a full resync
//! can repair; that surfaces as `ImplementationError`.

mod connection;
mod node;
mod resource;
mod snapshot;
mod stor_pool;

pub use connection::{NodeConnectionMirror, ResourceConnectionMirror, VolumeConnectionMirror};
pub use node::{NetInterfaceMirror, NodeMirror};
pub use resource::{ResourceDefinitionMirror, ResourceMirror, VolumeDefinitionMirror, VolumeMirror};
pub use snapshot::{
    SnapshotDefinitionMirror, SnapshotMirror, SnapshotVolumeDefinitionMirror, SnapshotVolumeMirror,
};
pub use stor_pool::{StorPoolDefinitionMirror, StorPoolMirror};

use uuid::Uuid;

use quarry::error::{QuarryError, QuarryResult};

pub(crate) fn check_uuid(kind: &'static str, pushed: Uuid, held: Uuid) -> QuarryResult<()> {
    if pushed != held {
        return Err(QuarryError::implementation_error(format!(
            "mirror divergence on {kind}: controller pushed uuid {pushed}, satellite holds {held}"
        )));
    }
    Ok(())
}
