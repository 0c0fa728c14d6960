// Activate some of the Rust 2024 lints to make the future migration easier.
#![warn(if_let_rescope)]
#![warn(keyword_idents_2024)]
#![warn(missing_unsafe_on_extern)]
#![warn(rust_2024_guarded_string_incompatible_syntax)]
#![warn(rust_2024_incompatible_pat)]
#![warn(tail_expr_drop_order)]
#![warn(unsafe_attr_outside_unsafe)]
#![warn(unsafe_op_in_unsafe_fn)]

//! Per-rank check that a process of a parallel job runs on exactly one NUMA
//! node, and that this node is the one closest to the device named by the
//! job's `dist:<device>` mapping policy.
//!
//! ```no_run
//! use {
//!     mindist::{validator::validate, Config},
//!     mindist_cpu_utils::SysfsTopology,
//! };
//!
//! let config = Config::from_env();
//! let topology = SysfsTopology::new(&config.sysfs_root, &config.procfs_root);
//! let outcome = validate(&topology, 1, config.policy.as_deref(), || {
//!     topology.cpu_affinity()
//! });
//! println!("{outcome:?}");
//! ```

pub mod config;
pub mod group;
pub mod policy;
pub mod precondition;
pub mod report;
pub mod validator;

pub use {
    config::Config,
    group::{GroupContext, LauncherGroup, ProcessGroup},
    report::Reporter,
    validator::Outcome,
};
