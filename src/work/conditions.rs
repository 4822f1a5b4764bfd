//! Device state checks used to evaluate work [`Constraints`].
//!
//! Reads are synchronous; the engine runs them on the blocking pool.
//!
//! [`Constraints`]: super::Constraints

use std::fs;
use std::path::{Path, PathBuf};

/// Battery percentage at or below which a discharging battery counts as low.
const BATTERY_LOW_PERCENT: u8 = 15;

pub trait DeviceConditions: Send + Sync {
    fn network_available(&self) -> bool;
    fn battery_low(&self) -> bool;
}

/// Reads network and battery state from Linux sysfs.
///
/// When the relevant sysfs directory is missing (other platforms, minimal
/// containers) the check reports the condition as met rather than blocking
/// work forever.
#[derive(Debug, Clone)]
pub struct HostConditions {
    net_dir: PathBuf,
    power_supply_dir: PathBuf,
}

impl Default for HostConditions {
    fn default() -> Self {
        Self::with_sysfs_root(Path::new("/sys"))
    }
}

impl HostConditions {
    pub fn with_sysfs_root(root: &Path) -> Self {
        Self {
            net_dir: root.join("class").join("net"),
            power_supply_dir: root.join("class").join("power_supply"),
        }
    }
}

impl DeviceConditions for HostConditions {
    fn network_available(&self) -> bool {
        let entries = match fs::read_dir(&self.net_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::trace!(path = %self.net_dir.display(), error = %e, "No interface list, assuming online");
                return true;
            }
        };

        entries.flatten().any(|entry| {
            if entry.file_name() == "lo" {
                return false;
            }
            match read_trimmed(&entry.path().join("operstate")) {
                // "unknown" is what tunnels and some virtual NICs report while passing traffic
                Some(state) => state == "up" || state == "unknown",
                None => false,
            }
        })
    }

    fn battery_low(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.power_supply_dir) else {
            return false;
        };

        entries.flatten().any(|entry| {
            let path = entry.path();
            if read_trimmed(&path.join("type")).as_deref() != Some("Battery") {
                return false;
            }
            let charging = matches!(
                read_trimmed(&path.join("status")).as_deref(),
                Some("Charging") | Some("Full")
            );
            let capacity = read_trimmed(&path.join("capacity")).and_then(|c| c.parse::<u8>().ok());
            !charging && capacity.is_some_and(|c| c <= BATTERY_LOW_PERCENT)
        })
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sysfs(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("headlines_sysfs_{}", name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("class").join("net")).unwrap();
        fs::create_dir_all(dir.join("class").join("power_supply")).unwrap();
        dir
    }

    fn add_interface(root: &Path, name: &str, state: &str) {
        let dir = root.join("class").join("net").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("operstate"), format!("{}\n", state)).unwrap();
    }

    fn add_battery(root: &Path, capacity: u8, status: &str) {
        let dir = root.join("class").join("power_supply").join("BAT0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("type"), "Battery\n").unwrap();
        fs::write(dir.join("capacity"), format!("{}\n", capacity)).unwrap();
        fs::write(dir.join("status"), format!("{}\n", status)).unwrap();
    }

    #[test]
    fn test_loopback_only_is_offline() {
        let root = sysfs("loopback_only");
        add_interface(&root, "lo", "unknown");
        add_interface(&root, "eth0", "down");

        assert!(!HostConditions::with_sysfs_root(&root).network_available());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_interface_up_is_online() {
        let root = sysfs("iface_up");
        add_interface(&root, "lo", "unknown");
        add_interface(&root, "wlan0", "up");

        assert!(HostConditions::with_sysfs_root(&root).network_available());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_missing_sysfs_reports_conditions_met() {
        let conditions = HostConditions::with_sysfs_root(Path::new("/nonexistent/headlines"));
        assert!(conditions.network_available());
        assert!(!conditions.battery_low());
    }

    #[test]
    fn test_discharging_battery_below_threshold_is_low() {
        let root = sysfs("battery_low");
        add_battery(&root, 9, "Discharging");
        assert!(HostConditions::with_sysfs_root(&root).battery_low());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_charging_battery_is_not_low() {
        let root = sysfs("battery_charging");
        add_battery(&root, 9, "Charging");
        assert!(!HostConditions::with_sysfs_root(&root).battery_low());
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_healthy_battery_is_not_low() {
        let root = sysfs("battery_ok");
        add_battery(&root, 80, "Discharging");
        assert!(!HostConditions::with_sysfs_root(&root).battery_low());
        fs::remove_dir_all(&root).ok();
    }
}
