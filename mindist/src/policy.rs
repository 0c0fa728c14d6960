//! Placement policy parsing.

/// Marker introducing the device a `dist` mapping policy is relative to.
pub const DIST_PREFIX: &str = "dist:";

/// Extract the device name from a mapping policy such as `dist:mlx5_0,span`.
///
/// The device runs from just after `dist:` to the next comma or the end of
/// the string. Returns `None` when the policy has no `dist:` marker or names
/// no device after it.
pub fn extract_device(policy: &str) -> Option<String> {
    let (_, rest) = policy.split_once(DIST_PREFIX)?;
    let device = rest.split_once(',').map_or(rest, |(device, _)| device);
    (!device.is_empty()).then(|| device.to_owned())
}
