//! Centralized path configuration for boxd network state.
//!
//! All persisted network artifacts resolve through this module so the
//! daemon and CLI agree on locations, whether running as root or a user.

use std::path::{Path, PathBuf};

/// Get the boxd data directory.
///
/// Resolution order:
/// 1. `BOXD_DATA_DIR` environment variable
/// 2. `/var/lib/boxd` if it exists (system install)
/// 3. `~/.boxd` for user-only installs
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BOXD_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/boxd");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::home_dir().map(|h| h.join(".boxd")).unwrap_or(system_dir)
}

/// Root of all persisted network state under a data directory.
pub fn networks_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("networks")
}

/// Path of the single IPAM blob holding every subnet's bitmap.
pub fn ipam_path(data_dir: &Path) -> PathBuf {
    networks_dir(data_dir).join("ipam").join("subnets.json")
}

/// Directory holding per-network config files, grouped by driver.
pub fn drivers_dir(data_dir: &Path) -> PathBuf {
    networks_dir(data_dir).join("drivers")
}

/// Config file for one network: `<data>/networks/drivers/<driver>/<name>.json`.
pub fn network_config_path(data_dir: &Path, driver: &str, name: &str) -> PathBuf {
    drivers_dir(data_dir).join(driver).join(format!("{}.json", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_consistency() {
        let base = Path::new("/tmp/boxd-test");
        assert!(ipam_path(base).starts_with(networks_dir(base)));
        assert!(drivers_dir(base).starts_with(networks_dir(base)));
        assert_eq!(
            network_config_path(base, "bridge", "net1"),
            base.join("networks/drivers/bridge/net1.json")
        );
    }
}
