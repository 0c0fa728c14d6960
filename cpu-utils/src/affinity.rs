//! Core CPU affinity operations.

use crate::error::CpuAffinityError;
#[cfg(target_os = "linux")]
use std::{collections::HashSet, fs, io, path::Path};

/// Maximum CPU ID that can be used with CPU_ISSET.
///
/// This is the standard Linux value defined in glibc. The kernel itself supports
/// more CPUs, but the cpu_set_t structure in glibc is fixed at this size.
#[cfg(target_os = "linux")]
const CPU_SETSIZE: usize = 1024;

/// Get the CPU affinity mask for the calling thread.
///
/// Returns a sorted vector of CPU IDs that the thread is allowed to run on. The
/// mask is read from the scheduler on every call and never cached.
///
/// # Examples
///
/// ```no_run
/// # use mindist_cpu_utils::*;
/// # fn main() -> Result<(), CpuAffinityError> {
/// let cpus = cpu_affinity()?;
/// println!("Thread can run on CPUs: {:?}", cpus);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`CpuAffinityError::Io`] if the system call fails.
/// Returns [`CpuAffinityError::NotSupported`] on non-Linux platforms.
#[cfg(target_os = "linux")]
pub fn cpu_affinity() -> Result<Vec<usize>, CpuAffinityError> {
    cpu_affinity_in(Path::new("/sys"))
}

#[cfg(not(target_os = "linux"))]
pub fn cpu_affinity() -> Result<Vec<usize>, CpuAffinityError> {
    Err(CpuAffinityError::NotSupported)
}

/// Same as [`cpu_affinity`], bounded by the online list below `sysfs_root`.
#[cfg(target_os = "linux")]
pub(crate) fn cpu_affinity_in(sysfs_root: &Path) -> Result<Vec<usize>, CpuAffinityError> {
    // safety: cpu_set_t is a POD type, zero-initialization is standard
    let mut cpu_set: libc::cpu_set_t = unsafe { std::mem::zeroed() };

    // safety: sched_getaffinity is safe with valid parameters
    let result = unsafe {
        libc::sched_getaffinity(
            0, // 0 means current thread
            std::mem::size_of::<libc::cpu_set_t>(),
            &mut cpu_set,
        )
    };

    if result != 0 {
        return Err(CpuAffinityError::Io(io::Error::last_os_error()));
    }

    let max_cpu = max_cpu_id_in(sysfs_root)?.min(CPU_SETSIZE - 1);
    let mut cpus = Vec::new();

    for cpu in 0..=max_cpu {
        // safety: CPU_ISSET is safe with valid cpu_set_t and cpu < CPU_SETSIZE
        let is_set = unsafe { libc::CPU_ISSET(cpu, &cpu_set) };
        if is_set {
            cpus.push(cpu);
        }
    }

    Ok(cpus)
}

/// Get the maximum CPU ID on the system (online CPUs only).
///
/// Reads from `/sys/devices/system/cpu/online` or falls back to `sysconf(_SC_NPROCESSORS_ONLN)`.
///
/// # Errors
///
/// Returns [`CpuAffinityError::Io`] if unable to determine CPU count.
/// Returns [`CpuAffinityError::NotSupported`] on non-Linux platforms.
#[cfg(target_os = "linux")]
pub fn max_cpu_id() -> Result<usize, CpuAffinityError> {
    max_cpu_id_in(Path::new("/sys"))
}

#[cfg(not(target_os = "linux"))]
pub fn max_cpu_id() -> Result<usize, CpuAffinityError> {
    Err(CpuAffinityError::NotSupported)
}

/// Same as [`max_cpu_id`], reading the online list below `sysfs_root`.
#[cfg(target_os = "linux")]
pub(crate) fn max_cpu_id_in(sysfs_root: &Path) -> Result<usize, CpuAffinityError> {
    let online = sysfs_root.join("devices/system/cpu/online");
    if let Ok(content) = fs::read_to_string(&online) {
        // The online list may have holes ("0-3,8-11"), the highest id is what we want
        match parse_cpu_range_list(content.trim()) {
            Ok(cpus) => {
                if let Some(&max) = cpus.last() {
                    return Ok(max);
                }
            }
            Err(err) => log::warn!("ignoring malformed {}: {err}", online.display()),
        }
    }

    // Fallback to sysconf for online processors.
    // safety: sysconf is safe to call
    let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };

    if count <= 0 {
        return Err(CpuAffinityError::Io(io::Error::last_os_error()));
    }

    Ok((count as usize).saturating_sub(1))
}

/// Get the total number of online logical CPUs (includes hyperthreads).
///
/// Equivalent to `max_cpu_id() + 1`.
///
/// # Errors
///
/// Returns [`CpuAffinityError::Io`] if unable to determine CPU count.
/// Returns [`CpuAffinityError::NotSupported`] on non-Linux platforms.
pub fn cpu_count() -> Result<usize, CpuAffinityError> {
    Ok(max_cpu_id()?.saturating_add(1))
}

/// Parse a CPU range list string (e.g., "0-3,5,7-9") into a sorted vector of CPU IDs.
#[cfg(target_os = "linux")]
pub(crate) fn parse_cpu_range_list(s: &str) -> Result<Vec<usize>, CpuAffinityError> {
    let mut cpus = HashSet::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start_str, end_str)) = part.split_once('-') {
            let start = start_str
                .trim()
                .parse::<usize>()
                .map_err(|_| CpuAffinityError::ParseError(format!("Invalid CPU range: {part}")))?;
            let end = end_str
                .trim()
                .parse::<usize>()
                .map_err(|_| CpuAffinityError::ParseError(format!("Invalid CPU range: {part}")))?;

            cpus.extend(start..=end);
        } else {
            let cpu = part
                .parse::<usize>()
                .map_err(|_| CpuAffinityError::ParseError(format!("Invalid CPU ID: {part}")))?;
            cpus.insert(cpu);
        }
    }

    let mut result: Vec<usize> = cpus.into_iter().collect();
    result.sort_unstable();
    Ok(result)
}
