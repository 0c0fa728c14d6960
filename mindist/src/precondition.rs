/// Whether a group of `group_size` processes can all fit on one NUMA node of
/// `cores_per_node` cores. When it cannot, the per-process check is skipped.
pub fn is_meaningful(group_size: usize, cores_per_node: usize) -> bool {
    group_size <= cores_per_node
}
