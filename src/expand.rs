//! Reference implementation of the segment expansion algorithm.
//!
//! This module is the normative description of how one template vertex plus
//! one segment instance become a clip-space position, and how the
//! interpolated varyings become a fragment alpha. `shaders/line.wgsl` is a
//! transliteration of these functions and must agree with them; the test
//! suite exercises the rendering contract against this implementation.

use glam::{Vec2, Vec3, Vec4};

use crate::camera::Camera;
use crate::line_style::{LineStyle, StyleFlags};

const DEGENERATE_EPSILON: f32 = 1e-12;

/// One segment instance as the expansion consumes it. Optional streams the
/// buffer does not carry use the neutral defaults from [Segment::new].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Vec3,
    pub end: Vec3,
    pub color_start: Vec3,
    pub color_end: Vec3,
    pub width_start: f32,
    pub width_end: f32,
    pub distance_start: f32,
    pub distance_end: f32,
}

impl Segment {
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self {
            start,
            end,
            color_start: Vec3::ONE,
            color_end: Vec3::ONE,
            width_start: 1.0,
            width_end: 1.0,
            distance_start: 0.0,
            distance_end: 0.0,
        }
    }
}

/// Vertex-stage outputs: the clip position plus every varying the fragment
/// stage consumes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandedVertex {
    pub clip: Vec4,
    /// Template corner coordinate, `[-1, 1]` on both axes. `y` is the
    /// cross-section offset; `x` only matters for texture lookups.
    pub uv: Vec2,
    /// Lengthwise coordinate measured from the start endpoint, in the
    /// expansion's units (pixels in screen mode, world units in world
    /// mode). Negative in the start cap, greater than `length` in the end
    /// cap.
    pub along: f32,
    /// Segment length in the same units as `along`.
    pub length: f32,
    /// Half-width at this vertex, same units.
    pub width: f32,
    /// Endpoint color (valid when the style uses vertex colors).
    pub color: Vec3,
    /// Cumulative dash distance, already scaled by `dash_scale`.
    pub distance: f32,
    /// View-space position of the expanded vertex (world-units coverage).
    pub view_pos: Vec3,
    /// View-space segment endpoints after trimming (world-units coverage).
    pub view_start: Vec3,
    pub view_end: Vec3,
}

/// Fragment-stage inputs: the interpolated varyings of [ExpandedVertex]
/// plus the screen-space derivative of the coverage quantity
/// (`fwidth(len2)` on the GPU; tests pass it explicitly).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentInput {
    pub uv: Vec2,
    pub along: f32,
    pub length: f32,
    pub width: f32,
    pub distance: f32,
    pub view_pos: Vec3,
    pub view_start: Vec3,
    pub view_end: Vec3,
    pub perspective: bool,
    pub filter_width: f32,
}

/// Fragment-stage verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coverage {
    /// The fragment is discarded (dash gap, or outside the cap circle).
    Discard,
    /// The fragment survives with this alpha (base opacity already
    /// applied).
    Alpha(f32),
}

/// Apply the style's per-endpoint affine remap. Identity when the style
/// does not enable [StyleFlags::ENDPOINT_REMAP].
pub fn remapped_endpoints(style: &LineStyle, segment: &Segment) -> (Vec3, Vec3) {
    if style.flags().contains(StyleFlags::ENDPOINT_REMAP) {
        (
            style.start_remap.apply(segment.start),
            style.end_remap.apply(segment.end),
        )
    } else {
        (segment.start, segment.end)
    }
}

/// Remap and view-transform the endpoints, then trim against the
/// conservative near-plane estimate when exactly one endpoint sits behind
/// it under a perspective projection. Both-behind segments pass through
/// untrimmed; downstream clipping removes them.
pub fn trimmed_view_endpoints(
    style: &LineStyle,
    camera: &Camera,
    segment: &Segment,
) -> (Vec3, Vec3) {
    let (actual_start, actual_end) = remapped_endpoints(style, segment);
    let mut start = camera.view_point(actual_start);
    let mut end = camera.view_point(actual_end);

    if camera.is_perspective() {
        let near = camera.near_estimate();
        if start.z < 0.0 && end.z >= 0.0 {
            end = trim_segment(start, end, near);
        } else if end.z < 0.0 && start.z >= 0.0 {
            start = trim_segment(end, start, near);
        }
    }
    (start, end)
}

// Move the far endpoint onto the near estimate along the segment.
fn trim_segment(keep: Vec3, moved: Vec3, near_estimate: f32) -> Vec3 {
    let alpha = (near_estimate - keep.z) / (moved.z - keep.z);
    keep.lerp(moved, alpha)
}

/// Expand one template vertex of one segment instance.
///
/// `template` is an entry of
/// [TEMPLATE_POSITIONS](crate::segment_buffer::TEMPLATE_POSITIONS):
/// `x` = lengthwise extension direction, `y` = side, `z` = endpoint
/// selector.
pub fn expand_vertex(
    style: &LineStyle,
    camera: &Camera,
    segment: &Segment,
    template: Vec3,
) -> ExpandedVertex {
    let flags = style.flags();
    let (actual_start, actual_end) = remapped_endpoints(style, segment);
    let (start, end) = trimmed_view_endpoints(style, camera, segment);

    let clip_start = camera.clip_from_view(start);
    let clip_end = camera.clip_from_view(end);

    let vary = flags.contains(StyleFlags::VARY_WIDTH);
    let width_start = style.linewidth * if vary { segment.width_start } else { 1.0 };
    let width_end = style.linewidth * if vary { segment.width_end } else { 1.0 };
    let width = if template.z < 0.5 { width_start } else { width_end };

    let color = if template.z < 0.5 {
        segment.color_start
    } else {
        segment.color_end
    };
    let distance = (segment.distance_start
        + (segment.distance_end - segment.distance_start) * template.z)
        * style.dash_scale;

    let clip;
    let along;
    let length;
    let mut view_pos = Vec3::ZERO;

    if flags.contains(StyleFlags::WORLD_UNITS) {
        // Camera-facing ribbon built directly in view space.
        let span = end - start;
        let dir = if span.length_squared() > DEGENERATE_EPSILON {
            span.normalize()
        } else {
            Vec3::X
        };
        let mid = start.lerp(end, 0.5);
        let forward = if mid.length_squared() > DEGENERATE_EPSILON {
            mid.normalize()
        } else {
            Vec3::Z
        };
        let mut up = dir.cross(forward);
        if up.length_squared() < DEGENERATE_EPSILON {
            up = dir.cross(Vec3::Y);
        }
        if up.length_squared() < DEGENERATE_EPSILON {
            up = Vec3::Z;
        }
        let up = up.normalize();

        // Square caps extend past the endpoints, except when dashing: the
        // dash test already discards incomplete caps.
        let cap = if flags.contains(StyleFlags::DASHED) {
            0.0
        } else {
            template.x * width
        };

        let endpoint = if template.z < 0.5 { start } else { end };
        let pos = endpoint + up * (template.y * width) + dir * cap;
        let mut c = camera.clip_from_view(pos);

        // Force each vertex onto its own endpoint's depth so adjacent
        // collinear segments do not z-fight.
        let clip_endpoint = if template.z < 0.5 { clip_start } else { clip_end };
        c.z = (clip_endpoint.z / clip_endpoint.w) * c.w;

        clip = c;
        length = span.length();
        along = template.z * length + cap;
        view_pos = pos;
    } else {
        // Screen-unit mode: expand in pixel space, then remix with the
        // endpoint-interpolated clip z/w so depth stays perspective-correct
        // while width ignores camera distance.
        let resolution = style.resolution;
        let ndc_start = clip_start.truncate() / clip_start.w;
        let ndc_end = clip_end.truncate() / clip_end.w;

        let screen_start =
            resolution * (0.5 * Vec2::new(ndc_start.x, ndc_start.y) + Vec2::splat(0.5));
        let screen_end = resolution * (0.5 * Vec2::new(ndc_end.x, ndc_end.y) + Vec2::splat(0.5));

        let delta = screen_end - screen_start;
        let (x_basis, y_basis) = if delta.length_squared() > DEGENERATE_EPSILON {
            let x = delta.normalize();
            (x, Vec2::new(-x.y, x.x))
        } else {
            // Coincident or end-on segments get a fixed basis instead of a
            // NaN normalize.
            (Vec2::new(0.0, -1.0), Vec2::new(1.0, 0.0))
        };

        // Coincident endpoints keep the quad degenerate (zero lengthwise
        // extent, so nothing rasterizes) unless the style is textured,
        // where the overhang is exactly what gives a label billboard its
        // area.
        let coincident = actual_start == actual_end;
        let lengthwise = if coincident && !flags.contains(StyleFlags::TEXTURED) {
            0.0
        } else {
            template.x * style.overshoot
        };

        let pt0 = screen_start + width_start * (template.y * y_basis + lengthwise * x_basis);
        let pt1 = screen_end + width_end * (template.y * y_basis + lengthwise * x_basis);
        let pt = pt0.lerp(pt1, template.z);
        let clip_mix = clip_start.lerp(clip_end, template.z);

        clip = Vec4::new(
            clip_mix.w * (2.0 * pt.x / resolution.x - 1.0),
            clip_mix.w * (2.0 * pt.y / resolution.y - 1.0),
            clip_mix.z,
            clip_mix.w,
        );
        length = delta.length();
        along = template.z * length + lengthwise * width;
    }

    ExpandedVertex {
        clip,
        uv: Vec2::new(template.x, template.y),
        along,
        length,
        width,
        color,
        distance,
        view_pos,
        view_start: start,
        view_end: end,
    }
}

/// Evaluate the fragment contract for one interpolated sample.
///
/// `flags` must be the style's *effective* flags (after degradations).
/// Textured variants sample their mask at [texture_uv] on the GPU instead
/// of the analytic test; here they report the base opacity.
pub fn fragment_alpha(style: &LineStyle, flags: StyleFlags, frag: &FragmentInput) -> Coverage {
    if flags.contains(StyleFlags::DASHED) {
        // World-units geometry keeps its cap vertices at the endpoints
        // when dashed, but guard the cap region anyway.
        if flags.contains(StyleFlags::WORLD_UNITS)
            && (frag.along < 0.0 || frag.along > frag.length)
        {
            return Coverage::Discard;
        }
        let period = style.dash_period();
        let phase = (frag.distance + style.dash_offset).rem_euclid(period);
        if phase > style.dash_size {
            return Coverage::Discard;
        }
    }

    let alpha = style.opacity;
    if flags.contains(StyleFlags::TEXTURED) {
        return Coverage::Alpha(alpha);
    }

    if flags.contains(StyleFlags::WORLD_UNITS) {
        let (origin, ray_dir) = if frag.perspective {
            let dir = if frag.view_pos.length_squared() > DEGENERATE_EPSILON {
                frag.view_pos.normalize()
            } else {
                Vec3::NEG_Z
            };
            (Vec3::ZERO, dir)
        } else {
            (
                Vec3::new(frag.view_pos.x, frag.view_pos.y, 0.0),
                Vec3::NEG_Z,
            )
        };
        let dist = ray_segment_distance(origin, ray_dir, frag.view_start, frag.view_end);
        let norm = dist / frag.width;
        return soft_edge(flags, norm * norm, frag.filter_width, alpha);
    }

    let u = cap_coordinate(frag.along, frag.length, frag.width);
    let v = frag.uv.y;
    let len2 = u * u + v * v;
    soft_edge(flags, len2, frag.filter_width, alpha)
}

// Shared edge test around `quantity == 1`: derivative-based soft band for
// coverage antialiasing, hard discard otherwise.
fn soft_edge(flags: StyleFlags, quantity: f32, filter_width: f32, alpha: f32) -> Coverage {
    if flags.contains(StyleFlags::COVERAGE_AA) {
        let d = filter_width.max(f32::EPSILON);
        Coverage::Alpha(alpha * (1.0 - smoothstep(1.0 - d, 1.0 + d, quantity)))
    } else if quantity >= 1.0 {
        Coverage::Discard
    } else {
        Coverage::Alpha(alpha)
    }
}

/// Lengthwise cap coordinate: zero over the segment body, the distance
/// beyond the nearest endpoint normalized by the half-width inside the
/// caps. For a zero-length segment the whole quad is cap.
pub fn cap_coordinate(along: f32, length: f32, width: f32) -> f32 {
    if width <= 0.0 {
        return 0.0;
    }
    if along < 0.0 {
        along / width
    } else if along > length {
        (along - length) / width
    } else {
        0.0
    }
}

/// Texture coordinate for the alpha mask: the template corner coordinate
/// remapped from `[-1, 1]` to `[0, 1]`.
pub fn texture_uv(uv: Vec2) -> Vec2 {
    uv * 0.5 + Vec2::splat(0.5)
}

/// Closest distance between a view ray and a 3D segment (both parameters
/// clamped), used by the world-units coverage.
pub fn ray_segment_distance(origin: Vec3, ray_dir: Vec3, seg_start: Vec3, seg_end: Vec3) -> f32 {
    let d2 = seg_end - seg_start;
    let w0 = origin - seg_start;

    let b = ray_dir.dot(d2);
    let c = d2.dot(d2);
    let d = ray_dir.dot(w0);
    let e = d2.dot(w0);

    let denom = c - b * b; // ray_dir is unit length
    let s = if denom.abs() > DEGENERATE_EPSILON {
        ((e - b * d) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let on_segment = seg_start + d2 * s;
    let t = ray_dir.dot(on_segment - origin).max(0.0);
    let on_ray = origin + ray_dir * t;
    on_segment.distance(on_ray)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment_buffer::TEMPLATE_POSITIONS;

    fn template(i: usize) -> Vec3 {
        Vec3::from_array(TEMPLATE_POSITIONS[i])
    }

    fn screen_style() -> LineStyle {
        LineStyle::new()
            .with_linewidth(4.0)
            .with_resolution(800.0, 600.0)
    }

    fn perspective_camera() -> Camera {
        Camera::perspective(std::f32::consts::FRAC_PI_4, 800.0 / 600.0, 0.1, 100.0)
            .look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y)
    }

    #[test]
    fn remap_collapses_start_axes_before_view_transform() {
        let style = screen_style().with_remap(
            crate::EndpointRemap::new(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO),
            crate::EndpointRemap::IDENTITY,
        );
        let segment = Segment::new(Vec3::new(3.0, -2.0, 7.0), Vec3::new(1.0, 1.0, 1.0));
        let (start, end) = remapped_endpoints(&style, &segment);
        assert_eq!(start, Vec3::new(0.0, 0.0, 7.0));
        assert_eq!(end, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn near_plane_trim_keeps_segment_in_front() {
        let style = screen_style();
        let camera = perspective_camera();
        // End sits behind the camera (view z > 0), start in front.
        let segment = Segment::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 20.0));
        let (start, end) = trimmed_view_endpoints(&style, &camera, &segment);
        assert!(start.z < 0.0);
        assert!((end.z - camera.near_estimate()).abs() < 1e-5);

        // Both in front: untouched.
        let segment = Segment::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 5.0));
        let (_, end) = trimmed_view_endpoints(&style, &camera, &segment);
        assert!((end.z - (-5.0)).abs() < 1e-5);
    }

    #[test]
    fn zero_length_segments_expand_without_nan() {
        let style = screen_style();
        let camera = perspective_camera();
        let segment = Segment::new(Vec3::ZERO, Vec3::ZERO);
        for i in 0..TEMPLATE_POSITIONS.len() {
            let v = expand_vertex(&style, &camera, &segment, template(i));
            assert!(v.clip.is_finite(), "vertex {i} produced {:?}", v.clip);
            assert!(v.along.is_finite());
        }
    }

    #[test]
    fn zero_length_solid_quad_is_degenerate() {
        // Padded coincident-point segments must be indistinguishable from
        // nothing drawn in solid screen-unit mode: the expanded corners
        // collapse onto a zero-area line across the width.
        let style = screen_style();
        let camera = perspective_camera();
        let segment = Segment::new(Vec3::ZERO, Vec3::ZERO);
        let corners: Vec<Vec2> = (0..TEMPLATE_POSITIONS.len())
            .map(|i| {
                let v = expand_vertex(&style, &camera, &segment, template(i));
                Vec2::new(v.clip.x / v.clip.w, v.clip.y / v.clip.w)
            })
            .collect();
        // All corners lie on one line segment: the lengthwise extent is zero.
        let lengthwise_extent = corners
            .iter()
            .map(|c| c.y)
            .fold(f32::NEG_INFINITY, f32::max)
            - corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
        // Fallback basis points the side axis along +x, so y carries no spread.
        assert!(lengthwise_extent.abs() < 1e-6);
    }

    #[test]
    fn textured_zero_length_quad_keeps_billboard_area() {
        let mut style = screen_style();
        style.set_flag(StyleFlags::TEXTURED, true);
        let camera = perspective_camera();
        let segment = Segment::new(Vec3::ZERO, Vec3::ZERO);
        let corners: Vec<Vec2> = (0..TEMPLATE_POSITIONS.len())
            .map(|i| {
                let v = expand_vertex(&style, &camera, &segment, template(i));
                Vec2::new(v.clip.x / v.clip.w, v.clip.y / v.clip.w)
            })
            .collect();
        let min = corners.iter().fold(Vec2::INFINITY, |m, c| m.min(*c));
        let max = corners.iter().fold(Vec2::NEG_INFINITY, |m, c| m.max(*c));
        let size = max - min;
        assert!(size.x > 0.0 && size.y > 0.0);
    }

    #[test]
    fn screen_width_is_invariant_to_camera_distance() {
        let style = screen_style();
        let segment = Segment::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let side = |eye_z: f32| {
            let camera = Camera::perspective(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 0.1, 100.0)
                .look_at(Vec3::new(0.0, 0.0, eye_z), Vec3::ZERO, Vec3::Y);
            // Template vertices 0 and 5 share endpoint/lengthwise coords
            // and differ only by side, so their pixel distance is the full
            // width of the quad.
            let a = expand_vertex(&style, &camera, &segment, template(0));
            let b = expand_vertex(&style, &camera, &segment, template(5));
            let pix = |v: &ExpandedVertex| {
                style.resolution
                    * (0.5 * Vec2::new(v.clip.x / v.clip.w, v.clip.y / v.clip.w) + Vec2::splat(0.5))
            };
            pix(&a).distance(pix(&b))
        };
        let near = side(5.0);
        let far = side(50.0);
        assert!((near - 2.0 * style.linewidth).abs() < 1e-3);
        assert!((near - far).abs() < 1e-3);
    }

    #[test]
    fn world_width_scales_inversely_with_camera_distance() {
        let mut style = screen_style();
        style.set_flag(StyleFlags::WORLD_UNITS, true);
        let segment = Segment::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        let ndc_width = |eye_z: f32| {
            let camera = Camera::perspective(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 0.1, 100.0)
                .look_at(Vec3::new(0.0, 0.0, eye_z), Vec3::ZERO, Vec3::Y);
            let a = expand_vertex(&style, &camera, &segment, template(0));
            let b = expand_vertex(&style, &camera, &segment, template(5));
            (Vec2::new(a.clip.x / a.clip.w, a.clip.y / a.clip.w)
                - Vec2::new(b.clip.x / b.clip.w, b.clip.y / b.clip.w))
            .length()
        };
        let near = ndc_width(5.0);
        let far = ndc_width(10.0);
        // Twice the distance, half the on-screen width.
        assert!((near / far - 2.0).abs() < 0.05);
    }

    #[test]
    fn per_endpoint_width_scales_apply_when_enabled() {
        let camera = perspective_camera();
        let mut segment = Segment::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        segment.width_start = 0.5;
        segment.width_end = 2.0;

        let plain = screen_style();
        let v = expand_vertex(&plain, &camera, &segment, template(0));
        assert_eq!(v.width, plain.linewidth);

        let mut varying = screen_style();
        varying.set_flag(StyleFlags::VARY_WIDTH, true);
        let start = expand_vertex(&varying, &camera, &segment, template(0));
        let end = expand_vertex(&varying, &camera, &segment, template(1));
        assert_eq!(start.width, varying.linewidth * 0.5);
        assert_eq!(end.width, varying.linewidth * 2.0);
    }

    #[test]
    fn dash_fraction_matches_duty_cycle() {
        let mut style = screen_style().with_dashes(3.0, 1.0);
        style.dash_offset = 0.0;
        let flags = style.effective_flags(1);

        let length = 40.0;
        let samples = 4000;
        let mut drawn = 0;
        for i in 0..samples {
            let distance = length * (i as f32 + 0.5) / samples as f32;
            let frag = FragmentInput {
                uv: Vec2::ZERO,
                along: 10.0,
                length: 20.0,
                width: 2.0,
                distance,
                view_pos: Vec3::ZERO,
                view_start: Vec3::ZERO,
                view_end: Vec3::ZERO,
                perspective: true,
                filter_width: 0.0,
            };
            if matches!(fragment_alpha(&style, flags, &frag), Coverage::Alpha(_)) {
                drawn += 1;
            }
        }
        let fraction = drawn as f32 / samples as f32;
        let expected = style.dash_size / style.dash_period();
        assert!((fraction - expected).abs() < 0.01, "fraction {fraction}");
    }

    #[test]
    fn dash_pattern_repeats_with_exact_period() {
        let style = screen_style().with_dashes(2.0, 1.5);
        let flags = style.effective_flags(1);
        let period = style.dash_period();
        for i in 0..100 {
            let d = i as f32 * 0.17;
            let frag = |distance: f32| FragmentInput {
                uv: Vec2::ZERO,
                along: 1.0,
                length: 2.0,
                width: 1.0,
                distance,
                view_pos: Vec3::ZERO,
                view_start: Vec3::ZERO,
                view_end: Vec3::ZERO,
                perspective: true,
                filter_width: 0.0,
            };
            assert_eq!(
                fragment_alpha(&style, flags, &frag(d)),
                fragment_alpha(&style, flags, &frag(d + period))
            );
        }
    }

    #[test]
    fn analytic_cap_alpha_at_centerline_and_boundary() {
        let mut style = screen_style();
        style.opacity = 0.8;
        let frag = |v: f32, filter_width: f32| FragmentInput {
            uv: Vec2::new(0.0, v),
            along: 5.0,
            length: 10.0,
            width: 2.0,
            distance: 0.0,
            view_pos: Vec3::ZERO,
            view_start: Vec3::ZERO,
            view_end: Vec3::ZERO,
            perspective: true,
            filter_width,
        };

        // Centerline: full base opacity.
        let hard = style.effective_flags(1);
        assert_eq!(fragment_alpha(&style, hard, &frag(0.0, 0.0)), Coverage::Alpha(0.8));

        // Width boundary, hard mode: transparent.
        assert_eq!(fragment_alpha(&style, hard, &frag(1.0, 0.0)), Coverage::Discard);

        // Width boundary, coverage mode: half opacity.
        style.set_flag(StyleFlags::COVERAGE_AA, true);
        let soft = style.effective_flags(4);
        match fragment_alpha(&style, soft, &frag(1.0, 0.05)) {
            Coverage::Alpha(a) => assert!((a - 0.4).abs() < 1e-3, "alpha {a}"),
            Coverage::Discard => panic!("coverage mode must not discard"),
        }
    }

    #[test]
    fn cap_coordinate_is_zero_over_the_body() {
        assert_eq!(cap_coordinate(5.0, 10.0, 2.0), 0.0);
        assert_eq!(cap_coordinate(-1.0, 10.0, 2.0), -0.5);
        assert_eq!(cap_coordinate(11.0, 10.0, 2.0), 0.5);
        // Zero-length segment: the whole quad is cap.
        assert_eq!(cap_coordinate(2.0, 0.0, 2.0), 1.0);
    }

    #[test]
    fn ray_segment_distance_basics() {
        // Ray down -z from origin, segment crossing it at distance 5.
        let d = ray_segment_distance(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::new(-1.0, 0.0, -5.0),
            Vec3::new(1.0, 0.0, -5.0),
        );
        assert!(d.abs() < 1e-6);

        // Segment offset sideways by 2.
        let d = ray_segment_distance(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::new(-1.0, 2.0, -5.0),
            Vec3::new(1.0, 2.0, -5.0),
        );
        assert!((d - 2.0).abs() < 1e-6);

        // Beyond the segment end the distance is taken to the endpoint.
        let d = ray_segment_distance(
            Vec3::ZERO,
            Vec3::NEG_Z,
            Vec3::new(3.0, 0.0, -5.0),
            Vec3::new(4.0, 0.0, -5.0),
        );
        assert!((d - 3.0).abs() < 1e-6);
    }

    #[test]
    fn texture_uv_remaps_corner_coordinates() {
        assert_eq!(texture_uv(Vec2::new(-1.0, -1.0)), Vec2::ZERO);
        assert_eq!(texture_uv(Vec2::new(1.0, 1.0)), Vec2::ONE);
        assert_eq!(texture_uv(Vec2::ZERO), Vec2::splat(0.5));
    }
}
