//! Driver registry: resolves the best installed driver for a connection's
//! vendor class, exposed to scripts as `driverLocator.*`.

use serde::{Deserialize, Serialize};

use wireline_types::{AttrMap, DriverDescriptor, DriverVersion, Result, WirelineError};

/// The driver keyword used as the parameter key for the resolved driver,
/// exposed to scripts as `driverLocator.keywordDriver`.
pub const KEYWORD_DRIVER: &str = "DRIVER";

/// Attribute carrying the connection's vendor class. Every builder
/// invocation is for exactly one class.
pub const CLASS_ATTR: &str = "class";

/// One installed driver known to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    /// Vendor class this driver serves (matches the `class` attribute).
    pub vendor: String,
    /// Driver name as it appears in the connection string.
    pub name: String,
    pub version: DriverVersion,
}

/// Registry of installed drivers.
///
/// Resolution is deterministic: among the entries for a vendor class the
/// highest version wins, ties broken by registration order (latest wins).
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    entries: Vec<DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: DriverEntry) {
        self.entries.push(entry);
    }

    pub fn has(&self, vendor: &str) -> bool {
        self.entries.iter().any(|e| e.vendor == vendor)
    }

    fn vendor_of(attr: &AttrMap) -> &str {
        attr.get(CLASS_ATTR).unwrap_or("")
    }

    /// Resolve the best installed driver for the map's vendor class.
    pub fn locate(&self, attr: &AttrMap) -> Result<DriverDescriptor> {
        let vendor = Self::vendor_of(attr);
        let best = self
            .entries
            .iter()
            .filter(|e| e.vendor == vendor)
            .max_by_key(|e| e.version);
        match best {
            Some(entry) => Ok(DriverDescriptor {
                name: entry.name.clone(),
                version: Some(entry.version),
            }),
            None => Err(WirelineError::DriverNotFound {
                vendor: vendor.to_string(),
            }),
        }
    }

    /// Resolved driver version as a `major.minor` string.
    pub fn locate_version(&self, attr: &AttrMap) -> Result<String> {
        let descriptor = self.locate(attr)?;
        // Registered entries always carry a version.
        let version = descriptor.version.unwrap_or(DriverVersion::new(0, 0));
        Ok(version.to_string())
    }

    /// The single version-gating predicate exposed to scripts: numeric
    /// comparison on (major, minor), never on strings.
    pub fn version_at_least(&self, attr: &AttrMap, major: u32, minor: u32) -> Result<bool> {
        let descriptor = self.locate(attr)?;
        Ok(descriptor
            .version
            .map(|v| v.is_at_least(major, minor))
            .unwrap_or(false))
    }

    /// A registry with the sample drivers used across the engine's own
    /// tests and golden fixtures.
    pub fn sample() -> Self {
        let mut registry = Self::new();
        registry.register(DriverEntry {
            vendor: "postgres".into(),
            name: "PostgreSQL Unicode".into(),
            version: DriverVersion::new(13, 2),
        });
        registry.register(DriverEntry {
            vendor: "mysql".into(),
            name: "MySQL ODBC 8.0 Driver".into(),
            version: DriverVersion::new(8, 0),
        });
        registry.register(DriverEntry {
            vendor: "mysql_legacy".into(),
            name: "MySQL ODBC 5.3 Driver".into(),
            version: DriverVersion::new(5, 3),
        });
        registry
    }
}

/// Convenience for tests and fixtures: a map with a vendor class plus extra
/// attributes.
pub fn attrs_for_vendor(vendor: &str, extra: &[(&str, &str)]) -> AttrMap {
    let mut map: AttrMap = [(CLASS_ATTR, vendor)].into_iter().collect();
    for (k, v) in extra {
        map.set(*k, *v);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_picks_highest_version_for_vendor() {
        let mut registry = DriverRegistry::new();
        registry.register(DriverEntry {
            vendor: "mysql".into(),
            name: "MySQL ODBC 5.3 Driver".into(),
            version: DriverVersion::new(5, 3),
        });
        registry.register(DriverEntry {
            vendor: "mysql".into(),
            name: "MySQL ODBC 8.0 Driver".into(),
            version: DriverVersion::new(8, 0),
        });
        let attr = attrs_for_vendor("mysql", &[]);
        let descriptor = registry.locate(&attr).unwrap();
        assert_eq!(descriptor.name, "MySQL ODBC 8.0 Driver");
    }

    #[test]
    fn locate_unknown_vendor_is_driver_not_found() {
        let registry = DriverRegistry::sample();
        let attr = attrs_for_vendor("sybase", &[]);
        let err = registry.locate(&attr).unwrap_err();
        match err {
            WirelineError::DriverNotFound { vendor } => assert_eq!(vendor, "sybase"),
            other => panic!("expected DriverNotFound, got {other:?}"),
        }
    }

    #[test]
    fn locate_version_renders_major_minor() {
        let registry = DriverRegistry::sample();
        let attr = attrs_for_vendor("mysql", &[]);
        assert_eq!(registry.locate_version(&attr).unwrap(), "8.0");
    }

    #[test]
    fn version_gate_is_numeric() {
        let mut registry = DriverRegistry::new();
        registry.register(DriverEntry {
            vendor: "mysql".into(),
            name: "MySQL ODBC 10.0 Driver".into(),
            version: DriverVersion::new(10, 0),
        });
        let attr = attrs_for_vendor("mysql", &[]);
        // "10.0" >= "8.0" is false lexicographically; must be true here.
        assert!(registry.version_at_least(&attr, 8, 0).unwrap());
        assert!(!registry.version_at_least(&attr, 10, 1).unwrap());
    }

    #[test]
    fn version_gate_below_threshold() {
        let registry = DriverRegistry::sample();
        let attr = attrs_for_vendor("mysql_legacy", &[]);
        assert!(!registry.version_at_least(&attr, 8, 0).unwrap());
    }
}
