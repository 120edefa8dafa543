//! Cluster-wide repositories.

use std::sync::Arc;

use quarry::access::AccessContext;
use quarry::identifier::{NodeName, ResourceName, StorPoolName};
use quarry::objects::{Node, ResourceDefinition, StorPoolDefinition};
use quarry::repository::Repository;

/// The three top-level maps of the cluster, each behind its own
/// reader/writer lock. Factories take the write guard for check-then-act
/// creation; everything else reads.
pub struct CoreRepos {
    pub nodes: Repository<NodeName, Arc<Node>>,
    pub resource_definitions: Repository<ResourceName, Arc<ResourceDefinition>>,
    pub stor_pool_definitions: Repository<StorPoolName, Arc<StorPoolDefinition>>,
}

impl CoreRepos {
    pub fn new(creator_ctx: &AccessContext) -> Self {
        Self {
            nodes: Repository::new(creator_ctx),
            resource_definitions: Repository::new(creator_ctx),
            stor_pool_definitions: Repository::new(creator_ctx),
        }
    }
}
