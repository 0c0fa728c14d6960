//! Rank and size of the parallel job this process belongs to.
//!
//! The launcher (`mpirun`, `srun`, ...) exports each process's rank and the
//! group size through its environment before the process starts. Nothing
//! here talks to other ranks.

use {
    log::{debug, error, info},
    std::{env, fmt, process},
    thiserror::Error,
};

/// Exit code used when the group cannot be bootstrapped.
pub const EXIT_BOOTSTRAP: i32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupContext {
    pub rank: usize,
    pub size: usize,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum GroupError {
    #[error("{launcher} set {rank_var} but not {size_var}")]
    MissingSize {
        launcher: Launcher,
        rank_var: &'static str,
        size_var: &'static str,
    },

    #[error("{var}={value:?} is not a valid process count")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var} reports an empty group")]
    EmptyGroup { var: &'static str },

    #[error("rank {rank} is outside a group of {size}")]
    RankOutOfRange { rank: usize, size: usize },
}

/// The job launcher that exported the rank and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Launcher {
    OpenMpi,
    Pmi,
    Slurm,
    Singleton,
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Launcher::OpenMpi => "Open MPI",
            Launcher::Pmi => "PMI",
            Launcher::Slurm => "Slurm",
            Launcher::Singleton => "singleton",
        })
    }
}

/// Rank and size variables per launcher, in lookup order.
const LAUNCHER_VARS: &[(Launcher, &str, &str)] = &[
    (Launcher::OpenMpi, "OMPI_COMM_WORLD_RANK", "OMPI_COMM_WORLD_SIZE"),
    (Launcher::Pmi, "PMI_RANK", "PMI_SIZE"),
    (Launcher::Slurm, "SLURM_PROCID", "SLURM_NTASKS"),
];

/// What the check needs from the process-group runtime.
pub trait ProcessGroup {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn context(&self) -> GroupContext {
        GroupContext {
            rank: self.rank(),
            size: self.size(),
        }
    }

    /// Terminate every process of the group with `code`. Usable before the
    /// local rank is known, like an abort on the world communicator.
    fn abort(code: i32) -> !
    where
        Self: Sized;

    /// Leave the group. Must be called once on every exit path.
    fn finalize(self);
}

#[derive(Debug)]
pub struct LauncherGroup {
    context: GroupContext,
    launcher: Launcher,
}

impl LauncherGroup {
    /// Join the group described by the process environment. A process
    /// started without a launcher forms a group of one.
    pub fn init() -> Result<Self, GroupError> {
        Self::init_from(|var| env::var(var).ok())
    }

    pub fn init_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GroupError> {
        for &(launcher, rank_var, size_var) in LAUNCHER_VARS {
            let Some(rank) = lookup(rank_var) else {
                continue;
            };
            let size = lookup(size_var).ok_or(GroupError::MissingSize {
                launcher,
                rank_var,
                size_var,
            })?;
            let rank = parse_count(rank_var, &rank)?;
            let size = parse_count(size_var, &size)?;
            if size == 0 {
                return Err(GroupError::EmptyGroup { var: size_var });
            }
            if rank >= size {
                return Err(GroupError::RankOutOfRange { rank, size });
            }

            debug!("{launcher} rank {rank} of {size}");
            return Ok(Self {
                context: GroupContext { rank, size },
                launcher,
            });
        }

        info!("no launcher environment found, running as a singleton");
        Ok(Self {
            context: GroupContext { rank: 0, size: 1 },
            launcher: Launcher::Singleton,
        })
    }

    pub fn launcher(&self) -> Launcher {
        self.launcher
    }
}

impl ProcessGroup for LauncherGroup {
    fn rank(&self) -> usize {
        self.context.rank
    }

    fn size(&self) -> usize {
        self.context.size
    }

    /// The launcher tears down the remaining ranks once one of them exits
    /// with a non-zero code.
    fn abort(code: i32) -> ! {
        error!("aborting process group with code {code}");
        process::exit(code)
    }

    fn finalize(self) {
        debug!("rank {} leaving {} group", self.context.rank, self.launcher);
    }
}

fn parse_count(var: &'static str, value: &str) -> Result<usize, GroupError> {
    value
        .trim()
        .parse()
        .map_err(|_| GroupError::InvalidValue {
            var,
            value: value.to_string(),
        })
}
