//! Lab persistence.
//!
//! A lab is stored as line-oriented, pipe-delimited text split into
//! `[SECTION]` blocks. Devices are referenced by their declaration-order
//! index, links and subnet owners by hostname.

mod reader;
mod writer;

use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::lab::Lab;
use crate::subnet::SubnetError;

pub use reader::load_from_str;
pub use writer::save_to_string;

/// File name used when no path is given
pub const DEFAULT_STATE_FILE: &str = "network_save.dat";

pub(crate) const SECTION_DEVICES: &str = "[DEVICES]";
pub(crate) const SECTION_CONNECTIONS: &str = "[CONNECTIONS]";
pub(crate) const SECTION_VLANS: &str = "[VLANS]";
pub(crate) const SECTION_SUBNETS: &str = "[SUBNETS]";
pub(crate) const SECTION_DEVICE_CONFIGS: &str = "[DEVICE_CONFIGS]";
pub(crate) const SECTION_INTERFACE_CONFIGS: &str = "[INTERFACE_CONFIGS]";
pub(crate) const SECTION_STATIC_ROUTES: &str = "[STATIC_ROUTES]";

pub(crate) const ASSIGNMENT_FREE: &str = "Free";
pub(crate) const ASSIGNMENT_SPLIT: &str = "Split (VLSM Parent)";
pub(crate) const ASSIGNMENT_PREFIX: &str = "Assigned: ";
pub(crate) const NO_HELPER: &str = "NONE";

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Could not access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Saved subnets are inconsistent: {0}")]
    Subnet(#[from] SubnetError),
}

/// Write `lab` to `path`.
pub fn save(lab: &Lab, path: &Path) -> Result<(), StateError> {
    fs::write(path, save_to_string(lab)).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("State saved to {}", path.display());
    Ok(())
}

/// Read a lab back from `path`.
pub fn load(path: &Path) -> Result<Lab, StateError> {
    let text = fs::read_to_string(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lab = load_from_str(&text)?;
    info!(
        "Loaded {} device(s), {} link(s) and {} subnet(s) from {}",
        lab.graph().devices().len(),
        lab.graph().links().len(),
        lab.forest().len(),
        path.display()
    );
    Ok(lab)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::DeviceClass;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_STATE_FILE);

        let lab = Lab::exam_template().unwrap();
        save(&lab, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.graph().devices().len(), 11);
        assert_eq!(loaded.graph().links().len(), 10);
        assert_eq!(loaded.forest().len(), 4);
        let lan_a = loaded
            .forest()
            .find_by_cidr(Ipv4Addr::new(192, 168, 1, 32), 27)
            .unwrap();
        assert_eq!(lan_a.dhcp.relay_helper, Some(Ipv4Addr::new(192, 168, 1, 130)));
        let router1 = loaded.graph().device_by_hostname("Router1").unwrap();
        assert_eq!(lan_a.dhcp.server, Some(router1.id));
        assert_eq!(router1.class(), DeviceClass::Router);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.dat")).unwrap_err();
        assert!(matches!(err, StateError::Io { .. }));
    }
}
