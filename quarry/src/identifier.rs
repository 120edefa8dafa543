//! Validated identifiers.
//!
//! ## Names
//!
//! Every object name is checked for length and charset at construction
//! time, before any graph mutation can occur. Names keep the caller's
//! display form, but equality, ordering and hashing use an uppercased
//! comparison key so that `node1` and `NODE1` address the same object.
//! The display form is what goes over the wire and into logs.
//!
//! ## Numbers
//!
//! TCP ports, device minor numbers and volume numbers are range-checked
//! newtypes. The ranges follow the DRBD limits (20-bit minor numbers,
//! 16-bit volume numbers) and are never widened silently.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Serialize};

use crate::error::{QuarryError, QuarryResult};

lazy_static! {
    static ref NODE_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,253}[A-Za-z0-9]$").unwrap();
    static ref RESOURCE_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{1,47}$").unwrap();
    static ref STOR_POOL_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{1,31}$").unwrap();
    static ref NET_INTERFACE_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{1,23}$").unwrap();
    static ref SNAPSHOT_NAME_REGEX: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]{1,47}$").unwrap();
}

fn validate_name(
    kind: &'static str,
    name: &str,
    pattern: &Regex,
    reserved: &[&str],
) -> QuarryResult<()> {
    if !pattern.is_match(name) {
        return Err(QuarryError::InvalidName {
            kind,
            name: name.to_owned(),
            reason: "invalid length or character set",
        });
    }
    if reserved.iter().any(|kw| name.eq_ignore_ascii_case(kw)) {
        return Err(QuarryError::InvalidName {
            kind,
            name: name.to_owned(),
            reason: "reserved keyword",
        });
    }
    Ok(())
}

macro_rules! name_type {
    ($(#[$docs:meta])* $name:ident, $kind:literal, $regex:ident, $reserved:expr) => {
        $(#[$docs])*
        #[derive(Clone, Debug)]
        pub struct $name {
            value: String,
            key: String,
        }

        impl $name {
            pub fn new(value: String) -> QuarryResult<Self> {
                validate_name($kind, &value, &$regex, $reserved)?;
                let key = value.to_uppercase();
                Ok(Self { value, key })
            }

            /// Returns the display form, exactly as the caller supplied it.
            pub fn as_str(&self) -> &str {
                &self.value
            }

            /// Returns the case-insensitive comparison key.
            pub fn key(&self) -> &str {
                &self.key
            }
        }

        impl FromStr for $name {
            type Err = QuarryError;

            fn from_str(value: &str) -> QuarryResult<Self> {
                Self::new(value.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmter: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmter.write_str(&self.value)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.key.cmp(&other.key)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key.hash(state);
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use de::Error;
                String::deserialize(deserializer)
                    .and_then(|s| Self::new(s).map_err(|e| Error::custom(e.to_string())))
            }
        }
    };
}

name_type! {
    /// The name of a cluster node.
    ///
    /// Hostname-like: 2 to 255 characters, alphanumeric at both ends,
    /// dots, dashes and underscores inside.
    NodeName, "node", NODE_NAME_REGEX, &[]
}

name_type! {
    /// The name of a replicated resource definition.
    ///
    /// 2 to 48 characters; `all` is reserved for CLI wildcard use.
    ResourceName, "resource", RESOURCE_NAME_REGEX, &["all"]
}

name_type! {
    /// The name of a storage pool definition.
    StorPoolName, "storage pool", STOR_POOL_NAME_REGEX, &[]
}

name_type! {
    /// The name of a node's network interface.
    NetInterfaceName, "net interface", NET_INTERFACE_NAME_REGEX, &[]
}

name_type! {
    /// The name of a point-in-time snapshot definition.
    SnapshotName, "snapshot", SNAPSHOT_NAME_REGEX, &[]
}

macro_rules! number_type {
    ($(#[$docs:meta])* $name:ident, $kind:literal, $inner:ty, $min:expr, $max:expr) => {
        $(#[$docs])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            pub const MIN: $inner = $min;
            pub const MAX: $inner = $max;

            pub fn new(value: $inner) -> QuarryResult<Self> {
                if !(Self::MIN..=Self::MAX).contains(&value) {
                    Err(QuarryError::ValueOutOfRange {
                        kind: $kind,
                        value: value as u64,
                        min: Self::MIN as u64,
                        max: Self::MAX as u64,
                    })
                } else {
                    Ok(Self(value))
                }
            }

            pub fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, fmter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(fmter, "{}", self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use de::Error;
                <$inner>::deserialize(deserializer)
                    .and_then(|v| Self::new(v).map_err(|e| Error::custom(e.to_string())))
            }
        }
    };
}

number_type! {
    /// A TCP port number for resource replication traffic.
    TcpPortNumber, "TCP port", u16, 1, u16::MAX
}

number_type! {
    /// A block device minor number (20-bit DRBD minor).
    MinorNumber, "minor number", u32, 0, 0x000F_FFFF
}

number_type! {
    /// The number of a volume within a resource definition.
    VolumeNumber, "volume number", u16, 0, u16::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name() {
        let names = vec!["node1", "Node-1.site_a", "n1", "a.very.long.fqdn-name"];
        for name in names {
            let parsed = NodeName::new(name.to_string()).unwrap();
            assert_eq!(name, parsed.as_str());
            assert_eq!(
                name,
                serde_json::from_str::<NodeName>(&format!("\"{}\"", name))
                    .unwrap()
                    .as_str(),
            );
        }

        let too_long = "n".repeat(256);
        let bad_names = vec!["", "x", "-node", "node-", "no de", "node!", &too_long];
        for name in bad_names {
            NodeName::new(name.to_string()).unwrap_err();
            serde_json::from_str::<NodeName>(&format!("\"{}\"", name)).unwrap_err();
        }
    }

    #[test]
    fn test_node_name_case_insensitive_identity() {
        let lower = NodeName::new("alpha".to_string()).unwrap();
        let upper = NodeName::new("ALPHA".to_string()).unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.key(), upper.key());
        // the display form is preserved
        assert_eq!("alpha", lower.as_str());
        assert_eq!("ALPHA", upper.as_str());
    }

    #[test]
    fn test_resource_name() {
        ResourceName::new("res1".to_string()).unwrap();
        ResourceName::new("_backup-target".to_string()).unwrap();

        ResourceName::new("1res".to_string()).unwrap_err();
        ResourceName::new("r".to_string()).unwrap_err();
        ResourceName::new("res.dotted".to_string()).unwrap_err();
        // reserved keyword, in any case
        ResourceName::new("all".to_string()).unwrap_err();
        ResourceName::new("All".to_string()).unwrap_err();
    }

    #[test]
    fn test_numbers() {
        assert_eq!(7000, TcpPortNumber::new(7000).unwrap().value());
        TcpPortNumber::new(0).unwrap_err();

        assert_eq!(0, MinorNumber::new(0).unwrap().value());
        assert_eq!(0x000F_FFFF, MinorNumber::new(MinorNumber::MAX).unwrap().value());
        MinorNumber::new(0x0010_0000).unwrap_err();

        assert_eq!(0, VolumeNumber::new(0).unwrap().value());
        VolumeNumber::new(u16::MAX).unwrap();
    }
}
