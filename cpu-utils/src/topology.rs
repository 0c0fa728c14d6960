//! CPU topology and NUMA locality detection.

use {
    crate::error::CpuAffinityError,
    std::{
        fmt,
        path::{Path, PathBuf},
    },
};
#[cfg(target_os = "linux")]
use {
    crate::affinity::{cpu_affinity_in, max_cpu_id_in, parse_cpu_range_list},
    log::{debug, warn},
    std::{collections::HashSet, fs},
};

/// Device classes searched, in order, for a device's `numa_node` attribute.
pub const DEVICE_CLASSES: &[&str] = &["infiniband", "net"];

/// Identifier of a NUMA node as numbered by the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumaNodeId(pub u32);

impl fmt::Display for NumaNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answers the topology questions the affinity check depends on.
///
/// Counting queries fail with an error when no data is available. Locality
/// queries return `None` when the platform does not expose the information.
pub trait TopologyQuery {
    /// Number of online logical CPUs.
    fn logical_cpu_count(&self) -> Result<usize, CpuAffinityError>;

    /// Distinct socket and core ids. Read once and derive both core counts
    /// from it to avoid querying the platform twice.
    fn socket_layout(&self) -> Result<SocketLayout, CpuAffinityError>;

    /// Number of distinct physical core ids, i.e. the cores of one socket.
    fn cores_per_socket(&self) -> Result<usize, CpuAffinityError> {
        Ok(self.socket_layout()?.cores_per_socket())
    }

    /// Distinct socket count multiplied by distinct core id count.
    fn total_physical_cores(&self) -> Result<usize, CpuAffinityError> {
        Ok(self.socket_layout()?.total_physical_cores())
    }

    /// NUMA node owning logical CPU `cpu`.
    fn numa_node_of_cpu(&self, cpu: usize) -> Option<NumaNodeId>;

    /// NUMA node the platform reports as local to the named device.
    fn numa_node_of_device(&self, device: &str) -> Option<NumaNodeId>;
}

/// Distinct socket and core identifiers seen across all logical CPUs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketLayout {
    pub sockets: usize,
    pub core_ids: usize,
}

impl SocketLayout {
    pub fn cores_per_socket(&self) -> usize {
        self.core_ids
    }

    /// Sockets times per-package core ids. On platforms that number core ids
    /// globally this overcounts; the product is kept as is.
    pub fn total_physical_cores(&self) -> usize {
        self.sockets.saturating_mul(self.core_ids)
    }
}

/// [`TopologyQuery`] backed by the kernel's procfs and sysfs trees.
///
/// Nothing is cached: every call reads the filesystem again.
///
/// # Examples
///
/// ```no_run
/// # use mindist_cpu_utils::*;
/// # fn main() -> Result<(), CpuAffinityError> {
/// let topology = SysfsTopology::default();
/// println!("cores per socket: {}", topology.cores_per_socket()?);
/// if let Some(node) = topology.numa_node_of_device("mlx5_0") {
///     println!("mlx5_0 is local to node {node}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SysfsTopology {
    sysfs_root: PathBuf,
    procfs_root: PathBuf,
}

impl Default for SysfsTopology {
    fn default() -> Self {
        Self::new("/sys", "/proc")
    }
}

impl SysfsTopology {
    pub fn new(sysfs_root: impl AsRef<Path>, procfs_root: impl AsRef<Path>) -> Self {
        Self {
            sysfs_root: sysfs_root.as_ref().to_path_buf(),
            procfs_root: procfs_root.as_ref().to_path_buf(),
        }
    }

    /// Affinity mask of the calling thread, bounded by the online CPUs listed
    /// below this topology's sysfs root.
    ///
    /// # Errors
    ///
    /// Returns [`CpuAffinityError::Io`] if the system call fails.
    /// Returns [`CpuAffinityError::NotSupported`] on non-Linux platforms.
    #[cfg(target_os = "linux")]
    pub fn cpu_affinity(&self) -> Result<Vec<usize>, CpuAffinityError> {
        cpu_affinity_in(&self.sysfs_root)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn cpu_affinity(&self) -> Result<Vec<usize>, CpuAffinityError> {
        Err(CpuAffinityError::NotSupported)
    }

    /// Count distinct sockets and core ids.
    ///
    /// `cpuinfo` is consulted first. Platforms whose `cpuinfo` carries no
    /// `physical id`/`core id` lines fall back to the per-CPU sysfs topology
    /// attributes.
    ///
    /// # Errors
    ///
    /// Returns [`CpuAffinityError::TopologyUnavailable`] if neither source has data.
    #[cfg(target_os = "linux")]
    fn read_socket_layout(&self) -> Result<SocketLayout, CpuAffinityError> {
        let cpuinfo = self.procfs_root.join("cpuinfo");
        match fs::read_to_string(&cpuinfo) {
            Ok(content) => {
                if let Some(layout) = parse_cpuinfo_layout(&content) {
                    return Ok(layout);
                }
                debug!("{} has no socket/core ids, using sysfs", cpuinfo.display());
            }
            Err(err) => warn!("unable to read {}: {err}", cpuinfo.display()),
        }

        self.sysfs_socket_layout()?.ok_or_else(|| {
            CpuAffinityError::TopologyUnavailable(format!(
                "no socket or core ids in {} or {}",
                cpuinfo.display(),
                self.cpu_dir().display()
            ))
        })
    }

    #[cfg(target_os = "linux")]
    fn cpu_dir(&self) -> PathBuf {
        self.sysfs_root.join("devices/system/cpu")
    }

    #[cfg(target_os = "linux")]
    fn sysfs_socket_layout(&self) -> Result<Option<SocketLayout>, CpuAffinityError> {
        let max_cpu = max_cpu_id_in(&self.sysfs_root)?;
        let mut sockets = HashSet::new();
        let mut core_ids = HashSet::new();

        for cpu in 0..=max_cpu {
            let topology = self.cpu_dir().join(format!("cpu{cpu}/topology"));
            if let Some(socket) = read_id(&topology.join("physical_package_id")) {
                sockets.insert(socket);
            }
            if let Some(core_id) = read_id(&topology.join("core_id")) {
                core_ids.insert(core_id);
            }
        }

        if sockets.is_empty() || core_ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(SocketLayout {
            sockets: sockets.len(),
            core_ids: core_ids.len(),
        }))
    }

    /// Look for the `nodeN` link the kernel places inside each CPU directory.
    #[cfg(target_os = "linux")]
    fn node_link_of_cpu(&self, cpu: usize) -> Option<NumaNodeId> {
        let entries = fs::read_dir(self.cpu_dir().join(format!("cpu{cpu}"))).ok()?;
        entries
            .filter_map(Result::ok)
            .find_map(|entry| parse_node_dir_name(&entry.file_name().to_string_lossy()))
    }

    /// Scan every node's cpulist for `cpu`.
    #[cfg(target_os = "linux")]
    fn node_cpulist_of_cpu(&self, cpu: usize) -> Option<NumaNodeId> {
        let node_dir = self.sysfs_root.join("devices/system/node");
        let entries = fs::read_dir(&node_dir).ok()?;
        for entry in entries.filter_map(Result::ok) {
            let Some(node) = parse_node_dir_name(&entry.file_name().to_string_lossy()) else {
                continue;
            };
            let Ok(content) = fs::read_to_string(entry.path().join("cpulist")) else {
                continue;
            };
            match parse_cpu_range_list(content.trim()) {
                Ok(cpus) if cpus.binary_search(&cpu).is_ok() => return Some(node),
                Ok(_) => {}
                Err(err) => warn!("ignoring cpulist of node {node}: {err}"),
            }
        }
        None
    }
}

#[cfg(target_os = "linux")]
impl TopologyQuery for SysfsTopology {
    fn logical_cpu_count(&self) -> Result<usize, CpuAffinityError> {
        Ok(max_cpu_id_in(&self.sysfs_root)?.saturating_add(1))
    }

    fn socket_layout(&self) -> Result<SocketLayout, CpuAffinityError> {
        self.read_socket_layout()
    }

    fn numa_node_of_cpu(&self, cpu: usize) -> Option<NumaNodeId> {
        self.node_link_of_cpu(cpu).or_else(|| self.node_cpulist_of_cpu(cpu))
    }

    fn numa_node_of_device(&self, device: &str) -> Option<NumaNodeId> {
        if device.is_empty() || device.contains('/') || device == "." || device == ".." {
            warn!("refusing to look up locality of device {device:?}");
            return None;
        }

        // The first class exposing the attribute decides, even when it says -1
        let content = DEVICE_CLASSES.iter().find_map(|class| {
            let path = self
                .sysfs_root
                .join("class")
                .join(class)
                .join(device)
                .join("device/numa_node");
            let content = fs::read_to_string(&path).ok()?;
            debug!("{}: {}", path.display(), content.trim());
            Some(content)
        })?;
        parse_numa_node(&content)
    }
}

#[cfg(not(target_os = "linux"))]
impl TopologyQuery for SysfsTopology {
    fn logical_cpu_count(&self) -> Result<usize, CpuAffinityError> {
        Err(CpuAffinityError::NotSupported)
    }

    fn socket_layout(&self) -> Result<SocketLayout, CpuAffinityError> {
        Err(CpuAffinityError::NotSupported)
    }

    fn numa_node_of_cpu(&self, _cpu: usize) -> Option<NumaNodeId> {
        None
    }

    fn numa_node_of_device(&self, _device: &str) -> Option<NumaNodeId> {
        None
    }
}

/// Count distinct `physical id` and `core id` values in `/proc/cpuinfo` text.
///
/// Returns `None` when either key never appears.
pub fn parse_cpuinfo_layout(content: &str) -> Option<SocketLayout> {
    let mut sockets = std::collections::HashSet::new();
    let mut core_ids = std::collections::HashSet::new();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let set = match key.trim() {
            "physical id" => &mut sockets,
            "core id" => &mut core_ids,
            _ => continue,
        };
        set.insert(value.trim().to_string());
    }

    if sockets.is_empty() || core_ids.is_empty() {
        return None;
    }
    Some(SocketLayout {
        sockets: sockets.len(),
        core_ids: core_ids.len(),
    })
}

/// Parse a sysfs `numa_node` attribute. The kernel writes `-1` when the
/// firmware provides no locality.
pub fn parse_numa_node(content: &str) -> Option<NumaNodeId> {
    let node = content.trim().parse::<i64>().ok()?;
    u32::try_from(node).ok().map(NumaNodeId)
}

#[cfg(target_os = "linux")]
fn parse_node_dir_name(name: &str) -> Option<NumaNodeId> {
    let id = name.strip_prefix("node")?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok().map(NumaNodeId)
}

#[cfg(target_os = "linux")]
fn read_id(path: &Path) -> Option<usize> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CPUINFO_2S_4C_HT: &str = "\
processor\t: 0
physical id\t: 0
core id\t\t: 0

processor\t: 1
physical id\t: 0
core id\t\t: 1

processor\t: 2
physical id\t: 1
core id\t\t: 0

processor\t: 3
physical id\t: 1
core id\t\t: 1

processor\t: 4
physical id\t: 0
core id\t\t: 0
";

    #[test]
    fn test_parse_cpuinfo_layout() {
        assert_eq!(
            parse_cpuinfo_layout(CPUINFO_2S_4C_HT),
            Some(SocketLayout {
                sockets: 2,
                core_ids: 2
            })
        );
        // aarch64 style cpuinfo has neither key
        assert_eq!(
            parse_cpuinfo_layout("processor\t: 0\nBogoMIPS\t: 50.00\n"),
            None
        );
        assert_eq!(parse_cpuinfo_layout(""), None);
    }

    #[test]
    fn test_socket_layout_counts() {
        let layout = SocketLayout {
            sockets: 2,
            core_ids: 8,
        };
        assert_eq!(layout.cores_per_socket(), 8);
        assert_eq!(layout.total_physical_cores(), 16);
    }

    #[test]
    fn test_parse_numa_node() {
        assert_eq!(parse_numa_node("1\n"), Some(NumaNodeId(1)));
        assert_eq!(parse_numa_node("0"), Some(NumaNodeId(0)));
        assert_eq!(parse_numa_node("-1\n"), None);
        assert_eq!(parse_numa_node(""), None);
        assert_eq!(parse_numa_node("garbage"), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_parse_node_dir_name() {
        assert_eq!(parse_node_dir_name("node3"), Some(NumaNodeId(3)));
        assert_eq!(parse_node_dir_name("node"), None);
        assert_eq!(parse_node_dir_name("node+1"), None);
        assert_eq!(parse_node_dir_name("cpufreq"), None);
        assert_eq!(parse_node_dir_name("possible"), None);
    }

    #[cfg(target_os = "linux")]
    mod fake_tree {
        use {super::*, assert_matches::assert_matches, std::fs, tempfile::TempDir};

        fn write(root: &Path, rel: &str, content: &str) {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        fn topology() -> (TempDir, TempDir, SysfsTopology) {
            let sys = tempfile::tempdir().unwrap();
            let proc = tempfile::tempdir().unwrap();
            let topology = SysfsTopology::new(sys.path(), proc.path());
            (sys, proc, topology)
        }

        #[test]
        fn test_layout_from_cpuinfo() {
            let (sys, proc, topology) = topology();
            write(proc.path(), "cpuinfo", CPUINFO_2S_4C_HT);
            write(sys.path(), "devices/system/cpu/online", "0-4\n");

            assert_eq!(topology.cores_per_socket().unwrap(), 2);
            assert_eq!(topology.total_physical_cores().unwrap(), 4);
            assert_eq!(topology.logical_cpu_count().unwrap(), 5);
        }

        #[test]
        fn test_layout_falls_back_to_sysfs() {
            let (sys, proc, topology) = topology();
            write(proc.path(), "cpuinfo", "processor\t: 0\nprocessor\t: 1\n");
            write(sys.path(), "devices/system/cpu/online", "0-3\n");
            for (cpu, package, core) in [(0, 0, 0), (1, 0, 1), (2, 0, 2), (3, 0, 3)] {
                let dir = format!("devices/system/cpu/cpu{cpu}/topology");
                write(sys.path(), &format!("{dir}/physical_package_id"), &format!("{package}\n"));
                write(sys.path(), &format!("{dir}/core_id"), &format!("{core}\n"));
            }

            assert_eq!(
                topology.socket_layout().unwrap(),
                SocketLayout {
                    sockets: 1,
                    core_ids: 4
                }
            );
            assert_eq!(topology.total_physical_cores().unwrap(), 4);
        }

        #[test]
        fn test_layout_unavailable() {
            let (sys, _proc, topology) = topology();
            write(sys.path(), "devices/system/cpu/online", "0-1\n");

            assert_matches!(
                topology.cores_per_socket(),
                Err(CpuAffinityError::TopologyUnavailable(_))
            );
        }

        #[test]
        fn test_numa_node_of_cpu_from_node_link() {
            let (sys, _proc, topology) = topology();
            fs::create_dir_all(sys.path().join("devices/system/cpu/cpu9/node1")).unwrap();
            fs::create_dir_all(sys.path().join("devices/system/cpu/cpu9/topology")).unwrap();

            assert_eq!(topology.numa_node_of_cpu(9), Some(NumaNodeId(1)));
        }

        #[test]
        fn test_numa_node_of_cpu_from_cpulist() {
            let (sys, _proc, topology) = topology();
            write(sys.path(), "devices/system/node/node0/cpulist", "0-7\n");
            write(sys.path(), "devices/system/node/node1/cpulist", "8-15\n");
            write(sys.path(), "devices/system/node/possible", "0-1\n");

            assert_eq!(topology.numa_node_of_cpu(3), Some(NumaNodeId(0)));
            assert_eq!(topology.numa_node_of_cpu(12), Some(NumaNodeId(1)));
            assert_eq!(topology.numa_node_of_cpu(64), None);
        }

        #[test]
        fn test_numa_node_of_device() {
            let (sys, _proc, topology) = topology();
            write(sys.path(), "class/infiniband/mlx5_0/device/numa_node", "1\n");
            write(sys.path(), "class/net/eth0/device/numa_node", "0\n");
            write(sys.path(), "class/net/eth1/device/numa_node", "-1\n");

            assert_eq!(topology.numa_node_of_device("mlx5_0"), Some(NumaNodeId(1)));
            assert_eq!(topology.numa_node_of_device("eth0"), Some(NumaNodeId(0)));
            assert_eq!(topology.numa_node_of_device("eth1"), None);
            assert_eq!(topology.numa_node_of_device("missing0"), None);
            assert_eq!(topology.numa_node_of_device(""), None);
            assert_eq!(topology.numa_node_of_device(".."), None);
            assert_eq!(topology.numa_node_of_device("../net/eth0"), None);
        }

        #[test]
        fn test_first_readable_device_class_decides() {
            let (sys, _proc, topology) = topology();
            write(sys.path(), "class/infiniband/dev0/device/numa_node", "-1\n");
            write(sys.path(), "class/net/dev0/device/numa_node", "1\n");
            write(sys.path(), "class/net/dev1/device/numa_node", "1\n");

            assert_eq!(topology.numa_node_of_device("dev0"), None);
            assert_eq!(topology.numa_node_of_device("dev1"), Some(NumaNodeId(1)));
        }

        #[test]
        fn test_cpu_affinity_bounded_by_sysfs_root() {
            let (sys, _proc, topology) = topology();
            write(sys.path(), "devices/system/cpu/online", "0\n");

            // Only CPU 0 is online below the fake root, so nothing else can show up
            let cpus = topology.cpu_affinity().unwrap();
            assert!(cpus.iter().all(|&cpu| cpu == 0), "{cpus:?}");
        }
    }
}
