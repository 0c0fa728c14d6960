//! Decides whether the calling process is confined to the NUMA node closest
//! to its device.

use {
    crate::{policy::extract_device, precondition::is_meaningful},
    log::debug,
    mindist_cpu_utils::{CpuAffinityError, NumaNodeId, TopologyQuery},
    thiserror::Error,
};

/// Exit code for a check that ran and found the property violated.
pub const EXIT_FAILED: i32 = 1;
/// Exit code for a check that could not run.
pub const EXIT_ERROR: i32 = 2;

/// Terminal result of one affinity check.
#[derive(Debug)]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed(Violation),
    Error(CheckError),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success | Outcome::Skipped(_) => 0,
            Outcome::Failed(_) => EXIT_FAILED,
            Outcome::Error(_) => EXIT_ERROR,
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code() == 0
    }
}

/// The check does not apply to this run.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SkipReason {
    #[error(
        "group too large for one NUMA node: {group_size} processes, {cores_per_node} cores per \
         node"
    )]
    GroupTooLarge {
        group_size: usize,
        cores_per_node: usize,
    },

    #[error("no dist policy specified")]
    NoDistPolicy,

    #[error("locality unknown for device {device}")]
    LocalityUnknown { device: String },
}

/// The check ran and the process is not confined to the expected node.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Violation {
    #[error(
        "scheduled across multiple NUMA nodes: cpu {cpu} is on node {node}, earlier cpus on \
         node {previous}"
    )]
    MultipleNodes {
        cpu: usize,
        node: NumaNodeId,
        previous: NumaNodeId,
    },

    #[error("scheduled on wrong NUMA node: observed {observed}, expected {expected}")]
    WrongNode {
        observed: NumaNodeId,
        expected: NumaNodeId,
    },
}

/// The check could not run.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("bad cpu count: {0}")]
    BadCpuCount(#[source] CpuAffinityError),

    #[error("affinity query failed: {0}")]
    AffinityQuery(#[source] CpuAffinityError),

    #[error("affinity query failed: empty affinity mask")]
    EmptyAffinity,

    #[error("cpu {cpu} is outside the {count} online cpus")]
    CpuOutOfRange { cpu: usize, count: usize },

    #[error("NUMA node unknown for cpu {cpu}")]
    CpuLocalityUnknown { cpu: usize },
}

/// Run the affinity check for one process of a group of `group_size`.
///
/// `policy` is the raw mapping policy, if the launcher set one. `read_affinity`
/// is called at most once, after every precondition has passed, and must
/// return the CPUs the process is currently allowed to run on.
pub fn validate<T, F>(
    topology: &T,
    group_size: usize,
    policy: Option<&str>,
    read_affinity: F,
) -> Outcome
where
    T: TopologyQuery + ?Sized,
    F: FnOnce() -> Result<Vec<usize>, CpuAffinityError>,
{
    let counts = topology
        .socket_layout()
        .and_then(|layout| Ok((layout, topology.logical_cpu_count()?)));
    let (layout, cpu_count) = match counts {
        Ok(counts) => counts,
        Err(err) => return Outcome::Error(CheckError::BadCpuCount(err)),
    };
    let total_cores = layout.total_physical_cores();
    let cores_per_node = layout.cores_per_socket();
    debug!("{total_cores} physical cores, {cores_per_node} per node, {cpu_count} logical cpus");

    if !is_meaningful(group_size, cores_per_node) {
        return Outcome::Skipped(SkipReason::GroupTooLarge {
            group_size,
            cores_per_node,
        });
    }

    let Some(device) = policy.and_then(extract_device) else {
        return Outcome::Skipped(SkipReason::NoDistPolicy);
    };

    let Some(expected) = topology.numa_node_of_device(&device) else {
        return Outcome::Skipped(SkipReason::LocalityUnknown { device });
    };
    debug!("{device} is local to node {expected}");

    let mask = match read_affinity() {
        Ok(mask) if mask.is_empty() => return Outcome::Error(CheckError::EmptyAffinity),
        Ok(mask) => mask,
        Err(err) => return Outcome::Error(CheckError::AffinityQuery(err)),
    };

    match observed_node(topology, &mask, cpu_count) {
        Ok(observed) if observed == expected => Outcome::Success,
        Ok(observed) => Outcome::Failed(Violation::WrongNode { observed, expected }),
        Err(outcome) => outcome,
    }
}

/// Fold the mask into the single node all of its CPUs live on, stopping at
/// the first CPU on a different node.
fn observed_node<T>(topology: &T, mask: &[usize], cpu_count: usize) -> Result<NumaNodeId, Outcome>
where
    T: TopologyQuery + ?Sized,
{
    let observed = mask.iter().try_fold(None::<NumaNodeId>, |previous, &cpu| {
        if cpu >= cpu_count {
            return Err(Outcome::Error(CheckError::CpuOutOfRange {
                cpu,
                count: cpu_count,
            }));
        }
        let node = topology
            .numa_node_of_cpu(cpu)
            .ok_or_else(|| Outcome::Error(CheckError::CpuLocalityUnknown { cpu }))?;
        match previous {
            Some(previous) if previous != node => Err(Outcome::Failed(Violation::MultipleNodes {
                cpu,
                node,
                previous,
            })),
            _ => Ok(Some(node)),
        }
    })?;
    // callers reject empty masks before folding
    observed.ok_or(Outcome::Error(CheckError::EmptyAffinity))
}
