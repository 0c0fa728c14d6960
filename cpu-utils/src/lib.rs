// Activate some of the Rust 2024 lints to make the future migration easier.
#![warn(if_let_rescope)]
#![warn(keyword_idents_2024)]
#![warn(missing_unsafe_on_extern)]
#![warn(rust_2024_guarded_string_incompatible_syntax)]
#![warn(rust_2024_incompatible_pat)]
#![warn(tail_expr_drop_order)]
#![warn(unsafe_attr_outside_unsafe)]
#![warn(unsafe_op_in_unsafe_fn)]

//! CPU affinity and NUMA topology queries for Linux systems.
//!
//! This crate reads the calling thread's CPU affinity mask and answers the
//! topology questions needed to decide which NUMA node a process runs on:
//! socket and core counts, the node owning a logical CPU, and the node local
//! to a named device such as an InfiniBand HCA or a network interface.
//!
//! # Platform Support
//!
//! Linux only. All functions return [`CpuAffinityError::NotSupported`] on other platforms.
//!
//! # Examples
//!
//! ```no_run
//! use mindist_cpu_utils::*;
//!
//! # fn main() -> Result<(), CpuAffinityError> {
//! let topology = SysfsTopology::default();
//! for cpu in cpu_affinity()? {
//!     println!("cpu {cpu} -> node {:?}", topology.numa_node_of_cpu(cpu));
//! }
//! # Ok(())
//! # }
//! ```
//!

mod affinity;
mod error;
mod topology;

pub use {
    affinity::{cpu_affinity, cpu_count, max_cpu_id},
    error::CpuAffinityError,
    topology::{
        parse_cpuinfo_layout, parse_numa_node, NumaNodeId, SocketLayout, SysfsTopology,
        TopologyQuery, DEVICE_CLASSES,
    },
};
