//! Instanced storage for line segment data.
//!
//! A [SegmentBuffer] holds one shared unit-quad template plus flat,
//! instance-rate arrays of per-segment data (positions, optional colors,
//! widths and dash distances). Every segment is expanded from the same six
//! template vertices on the GPU, so replacing segment data never touches
//! vertex geometry.

use glam::{Mat4, Vec3};

/// Number of vertices in the shared quad template.
pub const TEMPLATE_VERTEX_COUNT: usize = 6;

/// Floats per instance in the position stream (start xyz + end xyz).
pub const POSITION_STRIDE: usize = 6;

/// Floats per instance in the color stream (start rgb + end rgb).
pub const COLOR_STRIDE: usize = 6;

/// Floats per instance in the width and distance streams (start + end).
pub const SCALAR_STRIDE: usize = 2;

/// Template-local vertex coordinates for the two triangles of the quad.
///
/// Per vertex: `x` is the lengthwise extension direction (-1 = past the
/// start, +1 = past the end, used for caps/overshoot), `y` is the side of
/// the line (±1), and `z` selects the endpoint the vertex belongs to
/// (0 = start, 1 = end).
pub const TEMPLATE_POSITIONS: [[f32; 3]; TEMPLATE_VERTEX_COUNT] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, -1.0, 0.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 0.0],
];

/// Index list for the template. The trailing entry is inherited from the
/// reference geometry and is never drawn; see [TEMPLATE_DRAW_COUNT].
pub const TEMPLATE_INDICES: [u32; 7] = [0, 1, 2, 3, 4, 5, 6];

/// Number of template indices that form complete triangles.
pub const TEMPLATE_DRAW_COUNT: u32 = 6;

/// Errors reported by the mutating [SegmentBuffer] operations.
///
/// All validation happens at the call that supplies the data, never inside
/// the render path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The supplied array's length is not a positive multiple of the stream's stride.
    InvalidLength { len: usize, stride: usize },
    /// The supplied array does not cover the buffer's current instance count.
    LengthMismatch { expected: usize, got: usize },
    /// The buffer has no positions yet, so dependent streams cannot be validated.
    NoPositions,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength { len, stride } => {
                write!(f, "array length {len} is not a positive multiple of {stride}")
            }
            Self::LengthMismatch { expected, got } => {
                write!(f, "expected {expected} floats for the current instance count, got {got}")
            }
            Self::NoPositions => write!(f, "buffer has no positions set"),
        }
    }
}

impl std::error::Error for BufferError {}

/// Axis-aligned bounding box over all segment endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Center point of the box.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Dimensions of the box.
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Union of two boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Bounding sphere centered on the bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// A contiguous run of instances drawn with one style.
///
/// `count: None` means "through the end of the buffer", so a group can be
/// registered before the final instance count is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryGroup {
    pub start: u32,
    pub count: Option<u32>,
    pub style_index: u32,
}

/// Instanced data store for line segments.
///
/// Positions are the authoritative stream: the instance count is
/// `positions.len() / 6`, and every other stream is validated against it.
/// Optional attributes are buffer-wide: either every instance carries the
/// attribute or none does.
pub struct SegmentBuffer {
    positions: Vec<f32>,
    colors: Option<Vec<f32>>,
    widths: Option<Vec<f32>>,
    distances: Option<Vec<f32>>,
    groups: Vec<GeometryGroup>,
    bounding_box: Option<BoundingBox>,
    bounding_sphere: Option<BoundingSphere>,
    // Version counters so the renderer re-uploads only streams that changed.
    positions_version: u64,
    colors_version: u64,
    widths_version: u64,
    distances_version: u64,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            colors: None,
            widths: None,
            distances: None,
            groups: Vec::new(),
            bounding_box: None,
            bounding_sphere: None,
            positions_version: 0,
            colors_version: 0,
            widths_version: 0,
            distances_version: 0,
        }
    }

    /// Number of segment instances currently stored.
    pub fn instance_count(&self) -> usize {
        self.positions.len() / POSITION_STRIDE
    }

    /// Replace the position stream with a flat `[x0,y0,z0, x1,y1,z1, ...]`
    /// array, two points per segment.
    ///
    /// If a previous call supplied a longer array, the new one is
    /// zero-padded to the previous length: the instance count never
    /// shrinks, which keeps the GPU-side buffer stable at the cost of
    /// rendering coincident-point segments. Those degenerate segments are
    /// handled by the expansion's fallback basis and draw nothing visible.
    ///
    /// Bounding volumes are recomputed synchronously.
    pub fn set_positions(&mut self, points: &[f32]) -> Result<(), BufferError> {
        if points.is_empty() || points.len() % POSITION_STRIDE != 0 {
            return Err(BufferError::InvalidLength {
                len: points.len(),
                stride: POSITION_STRIDE,
            });
        }

        let prev_len = self.positions.len();
        self.positions.clear();
        self.positions.extend_from_slice(points);
        if self.positions.len() < prev_len {
            self.positions.resize(prev_len, 0.0);
        }
        self.positions_version = self.positions_version.wrapping_add(1);

        self.compute_bounding_box();
        self.compute_bounding_sphere();
        Ok(())
    }

    /// Replace the per-endpoint color stream (`[r,g,b]` per endpoint,
    /// start then end). Must cover the current instance count exactly.
    pub fn set_colors(&mut self, colors: &[f32]) -> Result<(), BufferError> {
        let expected = self.expected_len(COLOR_STRIDE)?;
        if colors.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                got: colors.len(),
            });
        }
        self.colors = Some(colors.to_vec());
        self.colors_version = self.colors_version.wrapping_add(1);
        Ok(())
    }

    /// Replace the per-endpoint width-scale stream (one float per endpoint,
    /// start then end). Scales multiply the style's base line width.
    pub fn set_widths(&mut self, scales: &[f32]) -> Result<(), BufferError> {
        let expected = self.expected_len(SCALAR_STRIDE)?;
        if scales.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                got: scales.len(),
            });
        }
        self.widths = Some(scales.to_vec());
        self.widths_version = self.widths_version.wrapping_add(1);
        Ok(())
    }

    /// Replace the per-endpoint cumulative distance stream used for
    /// dashing. Normally written by `LineObject::compute_line_distances`.
    pub fn set_distances(&mut self, distances: &[f32]) -> Result<(), BufferError> {
        let expected = self.expected_len(SCALAR_STRIDE)?;
        if distances.len() != expected {
            return Err(BufferError::LengthMismatch {
                expected,
                got: distances.len(),
            });
        }
        self.distances = Some(distances.to_vec());
        self.distances_version = self.distances_version.wrapping_add(1);
        Ok(())
    }

    fn expected_len(&self, stride: usize) -> Result<usize, BufferError> {
        let count = self.instance_count();
        if count == 0 {
            return Err(BufferError::NoPositions);
        }
        Ok(count * stride)
    }

    /// Transform every segment endpoint in place by an affine matrix.
    /// Bounding volumes are recomputed if they were previously computed.
    pub fn apply_transform(&mut self, matrix: &Mat4) {
        for chunk in self.positions.chunks_exact_mut(3) {
            let p = matrix.transform_point3(Vec3::new(chunk[0], chunk[1], chunk[2]));
            chunk[0] = p.x;
            chunk[1] = p.y;
            chunk[2] = p.z;
        }
        self.positions_version = self.positions_version.wrapping_add(1);

        if self.bounding_box.is_some() {
            self.compute_bounding_box();
        }
        if self.bounding_sphere.is_some() {
            self.compute_bounding_sphere();
        }
    }

    /// Recompute the bounding box as the axis-aligned union over all start
    /// and end points.
    pub fn compute_bounding_box(&mut self) {
        let mut bounds: Option<BoundingBox> = None;
        for p in self.endpoints() {
            bounds = Some(match bounds {
                Some(b) => BoundingBox {
                    min: b.min.min(p),
                    max: b.max.max(p),
                },
                None => BoundingBox { min: p, max: p },
            });
        }
        self.bounding_box = bounds;
    }

    /// Recompute the bounding sphere: centered on the bounding box, radius
    /// reaching the farthest endpoint.
    ///
    /// A NaN radius indicates malformed position data (NaN/Inf
    /// coordinates); it is reported as a diagnostic and the sphere keeps
    /// the NaN radius so culling code can detect it, but nothing crashes.
    pub fn compute_bounding_sphere(&mut self) {
        if self.bounding_box.is_none() {
            self.compute_bounding_box();
        }
        let Some(bbox) = self.bounding_box else {
            self.bounding_sphere = None;
            return;
        };

        let center = bbox.center();
        let mut max_radius_sq = 0.0f32;
        for p in self.endpoints() {
            // f32::max would swallow NaN distances, hiding malformed data.
            let d = center.distance_squared(p);
            if d.is_nan() || d > max_radius_sq {
                max_radius_sq = d;
            }
        }
        let radius = max_radius_sq.sqrt();
        if radius.is_nan() {
            log::error!(
                "SegmentBuffer::compute_bounding_sphere: computed radius is NaN; \
                 the position data likely contains NaN values"
            );
        }
        self.bounding_sphere = Some(BoundingSphere { center, radius });
    }

    /// Bounding box over all endpoints, if positions have been set.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box
    }

    /// Bounding sphere over all endpoints, if positions have been set.
    pub fn bounding_sphere(&self) -> Option<BoundingSphere> {
        self.bounding_sphere
    }

    /// Register a run of instances to be drawn with the style at
    /// `style_index` on the owning `LineObject`.
    pub fn add_group(&mut self, start: u32, count: Option<u32>, style_index: u32) {
        self.groups.push(GeometryGroup {
            start,
            count,
            style_index,
        });
    }

    pub fn clear_groups(&mut self) {
        self.groups.clear();
    }

    pub fn groups(&self) -> &[GeometryGroup] {
        &self.groups
    }

    /// Resolve a group to a concrete instance range, clamped to the
    /// current instance count.
    pub fn group_range(&self, group: &GeometryGroup) -> std::ops::Range<u32> {
        let total = self.instance_count() as u32;
        let start = group.start.min(total);
        let end = match group.count {
            Some(count) => start.saturating_add(count).min(total),
            None => total,
        };
        start..end
    }

    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[f32]> {
        self.colors.as_deref()
    }

    pub fn widths(&self) -> Option<&[f32]> {
        self.widths.as_deref()
    }

    pub fn distances(&self) -> Option<&[f32]> {
        self.distances.as_deref()
    }

    /// Start and end points of the instance at `index`.
    pub fn segment(&self, index: usize) -> Option<(Vec3, Vec3)> {
        let base = index * POSITION_STRIDE;
        let s = self.positions.get(base..base + POSITION_STRIDE)?;
        Some((
            Vec3::new(s[0], s[1], s[2]),
            Vec3::new(s[3], s[4], s[5]),
        ))
    }

    pub(crate) fn positions_version(&self) -> u64 {
        self.positions_version
    }

    pub(crate) fn colors_version(&self) -> u64 {
        self.colors_version
    }

    pub(crate) fn widths_version(&self) -> u64 {
        self.widths_version
    }

    pub(crate) fn distances_version(&self) -> u64 {
        self.distances_version
    }

    fn endpoints(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
    }
}

impl Default for SegmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_count_from_positions() {
        let mut buffer = SegmentBuffer::new();
        buffer
            .set_positions(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 2.0, 0.0])
            .unwrap();
        assert_eq!(buffer.instance_count(), 2);
    }

    #[test]
    fn rejects_bad_lengths() {
        let mut buffer = SegmentBuffer::new();
        assert_eq!(
            buffer.set_positions(&[1.0, 2.0, 3.0]),
            Err(BufferError::InvalidLength { len: 3, stride: 6 })
        );
        assert_eq!(
            buffer.set_positions(&[]),
            Err(BufferError::InvalidLength { len: 0, stride: 6 })
        );
    }

    #[test]
    fn dependent_streams_validate_against_instance_count() {
        let mut buffer = SegmentBuffer::new();
        assert_eq!(buffer.set_widths(&[1.0, 1.0]), Err(BufferError::NoPositions));

        buffer
            .set_positions(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap();
        assert!(buffer.set_widths(&[1.0, 2.0]).is_ok());
        assert_eq!(
            buffer.set_widths(&[1.0, 2.0, 3.0]),
            Err(BufferError::LengthMismatch { expected: 2, got: 3 })
        );
        assert!(buffer.set_colors(&[1.0; 6]).is_ok());
        assert_eq!(
            buffer.set_colors(&[1.0; 9]),
            Err(BufferError::LengthMismatch { expected: 6, got: 9 })
        );
    }

    #[test]
    fn bounding_box_is_union_of_endpoints() {
        let mut buffer = SegmentBuffer::new();
        buffer
            .set_positions(&[
                -1.0, 2.0, 0.0, 3.0, -4.0, 1.0, //
                0.5, 0.5, -2.0, 0.0, 0.0, 0.0,
            ])
            .unwrap();
        let bbox = buffer.bounding_box().unwrap();
        assert_eq!(bbox.min, Vec3::new(-1.0, -4.0, -2.0));
        assert_eq!(bbox.max, Vec3::new(3.0, 2.0, 1.0));

        let sphere = buffer.bounding_sphere().unwrap();
        assert_eq!(sphere.center, bbox.center());
        // Radius must reach the farthest endpoint.
        let expected = buffer
            .positions()
            .chunks_exact(3)
            .map(|c| sphere.center.distance(Vec3::new(c[0], c[1], c[2])))
            .fold(0.0f32, f32::max);
        assert!((sphere.radius - expected).abs() < 1e-6);
    }

    #[test]
    fn shorter_positions_pad_instead_of_shrinking() {
        let mut buffer = SegmentBuffer::new();
        buffer.set_positions(&[1.0; 12]).unwrap();
        assert_eq!(buffer.instance_count(), 2);

        buffer.set_positions(&[2.0; 6]).unwrap();
        assert_eq!(buffer.instance_count(), 2);
        // The padded instance is a coincident-point (zero-length) segment.
        let (start, end) = buffer.segment(1).unwrap();
        assert_eq!(start, Vec3::ZERO);
        assert_eq!(end, Vec3::ZERO);
    }

    #[test]
    fn nan_positions_report_nan_radius() {
        let mut buffer = SegmentBuffer::new();
        buffer
            .set_positions(&[f32::NAN, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap();
        let sphere = buffer.bounding_sphere().unwrap();
        assert!(sphere.radius.is_nan());
    }

    #[test]
    fn apply_transform_moves_points_and_bounds() {
        let mut buffer = SegmentBuffer::new();
        buffer
            .set_positions(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap();
        buffer.apply_transform(&Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));

        let (start, end) = buffer.segment(0).unwrap();
        assert_eq!(start, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(end, Vec3::new(1.0, 5.0, 0.0));
        assert_eq!(buffer.bounding_box().unwrap().min, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn groups_resolve_and_clamp() {
        let mut buffer = SegmentBuffer::new();
        buffer.set_positions(&[0.0; 18]).unwrap();
        buffer.add_group(0, None, 0);
        buffer.add_group(1, Some(10), 1);

        let groups: Vec<_> = buffer.groups().to_vec();
        assert_eq!(buffer.group_range(&groups[0]), 0..3);
        assert_eq!(buffer.group_range(&groups[1]), 1..3);
    }
}
