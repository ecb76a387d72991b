//! Interpolation primitives used by grid lookups.

/// Distance below which a continuous cell coordinate is treated as a node.
pub const NODE_SNAP_EPSILON: f64 = 1e-9;

/// Normalized longitudes are quantized to `1 / LONGITUDE_SCALE` degrees.
pub const LONGITUDE_SCALE: f64 = 1e9;

/// Bilinear blend of four corner values.
///
/// Corners are ordered `[v00, v10, v01, v11]` where the first index is the
/// column offset and the second the row offset. Corners with zero weight are
/// skipped, so a missing (NaN) neighbour does not leak into a sample taken
/// exactly on a node or along a cell edge.
pub fn bilinear_blend(corners: [f64; 4], fx: f64, fy: f64) -> f64 {
    let weights = [
        (1.0 - fx) * (1.0 - fy),
        fx * (1.0 - fy),
        (1.0 - fx) * fy,
        fx * fy,
    ];

    corners
        .iter()
        .zip(weights.iter())
        .filter(|(_, w)| **w != 0.0)
        .map(|(v, w)| v * w)
        .sum()
}

/// Snap a continuous coordinate onto the nearest integer when within
/// [`NODE_SNAP_EPSILON`] of it.
pub fn snap_to_node(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < NODE_SNAP_EPSILON {
        rounded
    } else {
        value
    }
}

/// Clamp a possibly negative index into `[0, len)`.
pub fn clamp_index(index: i64, len: usize) -> usize {
    index.clamp(0, len as i64 - 1) as usize
}

/// Offset of `lon` east of `origin_lon`, reduced into `[0, 360)`.
///
/// The result is quantized to one nanodegree so that `lon`, `lon + 360`
/// and `lon - 360` land on the same offset.
pub fn longitude_offset(lon: f64, origin_lon: f64) -> f64 {
    let offset = (lon - origin_lon).rem_euclid(360.0);
    let offset = (offset * LONGITUDE_SCALE).round() / LONGITUDE_SCALE;
    if offset >= 360.0 {
        offset - 360.0
    } else {
        offset
    }
}
