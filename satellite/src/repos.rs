//! The satellite's top-level maps.

use std::sync::Arc;

use quarry::access::AccessContext;
use quarry::identifier::{NodeName, ResourceName, StorPoolName};
use quarry::objects::{Node, ResourceDefinition, StorPoolDefinition};
use quarry::repository::Repository;

/// The same three top-level maps a controller keeps, holding only the
/// slice of the cluster this satellite has been told about.
pub struct SatelliteRepos {
    pub nodes: Repository<NodeName, Arc<Node>>,
    pub resource_definitions: Repository<ResourceName, Arc<ResourceDefinition>>,
    pub stor_pool_definitions: Repository<StorPoolName, Arc<StorPoolDefinition>>,
}

impl SatelliteRepos {
    pub fn new(creator_ctx: &AccessContext) -> Self {
        Self {
            nodes: Repository::new(creator_ctx),
            resource_definitions: Repository::new(creator_ctx),
            stor_pool_definitions: Repository::new(creator_ctx),
        }
    }
}
