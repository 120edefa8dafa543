//! API data projections.
//!
//! Flat snapshots of the entity graph handed to the API and transport
//! layers. A projection is only produced through the owning entity's
//! access-checked `api_data` method, so a snapshot never contains fields
//! the requesting context was not allowed to view.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct NodeApi {
    pub uuid: String,
    pub name: String,
    pub node_type: &'static str,
    pub flags: Vec<String>,
    pub net_interfaces: Vec<NetInterfaceApi>,
    pub props: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NetInterfaceApi {
    pub uuid: String,
    pub name: String,
    pub address: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SatelliteConnectionApi {
    pub uuid: String,
    pub net_interface: String,
    pub port: u16,
    pub encryption_type: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResourceDefinitionApi {
    pub uuid: String,
    pub name: String,
    pub port: u16,
    pub transport_type: &'static str,
    pub flags: Vec<String>,
    pub volume_definitions: Vec<VolumeDefinitionApi>,
    pub props: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VolumeDefinitionApi {
    pub uuid: String,
    pub volume_number: u16,
    pub minor_number: u32,
    pub size_kib: u64,
    pub flags: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResourceApi {
    pub uuid: String,
    pub node_name: String,
    pub resource_name: String,
    pub flags: Vec<String>,
    pub volumes: Vec<VolumeApi>,
    pub props: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VolumeApi {
    pub uuid: String,
    pub volume_number: u16,
    pub stor_pool_name: String,
    pub block_device_path: Option<String>,
    pub meta_disk_path: Option<String>,
    pub flags: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StorPoolDefinitionApi {
    pub uuid: String,
    pub name: String,
    pub props: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StorPoolApi {
    pub uuid: String,
    pub node_name: String,
    pub stor_pool_name: String,
    pub driver_name: String,
    pub props: Vec<(String, String)>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotDefinitionApi {
    pub uuid: String,
    pub resource_name: String,
    pub snapshot_name: String,
    pub flags: Vec<String>,
    pub snapshot_volume_definitions: Vec<SnapshotVolumeDefinitionApi>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotVolumeDefinitionApi {
    pub uuid: String,
    pub volume_number: u16,
    pub size_kib: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotApi {
    pub uuid: String,
    pub node_name: String,
    pub resource_name: String,
    pub snapshot_name: String,
    pub flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_api_serializes_flat() {
        let api = NodeApi {
            uuid: "00000000-0000-0000-0000-000000000000".to_owned(),
            name: "alpha".to_owned(),
            node_type: "SATELLITE",
            flags: vec!["DELETE".to_owned()],
            net_interfaces: vec![NetInterfaceApi {
                uuid: "00000000-0000-0000-0000-000000000001".to_owned(),
                name: "eth0".to_owned(),
                address: "10.0.0.1".to_owned(),
            }],
            props: vec![("site".to_owned(), "rack1".to_owned())],
        };
        let value = serde_json::to_value(&api).unwrap();
        assert_eq!("alpha", value["name"]);
        assert_eq!("SATELLITE", value["node_type"]);
        assert_eq!("eth0", value["net_interfaces"][0]["name"]);
    }
}
