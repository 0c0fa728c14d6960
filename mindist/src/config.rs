//! Settings read from the environment at startup.

use std::{env, path::PathBuf};

/// Mapping policy exported by Open MPI's `--map-by` option.
pub const POLICY_VAR: &str = "OMPI_MCA_rmaps_base_mapping_policy";
pub const SYSFS_ROOT_VAR: &str = "MINDIST_SYSFS_ROOT";
pub const PROCFS_ROOT_VAR: &str = "MINDIST_PROCFS_ROOT";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Raw placement policy, `None` when the launcher did not set one.
    pub policy: Option<String>,
    pub sysfs_root: PathBuf,
    pub procfs_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: None,
            sysfs_root: PathBuf::from("/sys"),
            procfs_root: PathBuf::from("/proc"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        Self {
            policy: lookup(POLICY_VAR),
            sysfs_root: lookup(SYSFS_ROOT_VAR).map_or(default.sysfs_root, PathBuf::from),
            procfs_root: lookup(PROCFS_ROOT_VAR).map_or(default.procfs_root, PathBuf::from),
        }
    }
}
