//! Rendering configuration for line objects.
//!
//! A [LineStyle] holds every toggle and numeric parameter of the expansion
//! algorithm. Each distinct combination of [StyleFlags] selects a
//! specialized compiled shader variant; the numeric parameters feed the
//! per-style uniform buffer and can change freely between frames.

use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use glam::{Vec2, Vec3};
use iced::Color;
use iced::wgpu::TextureView;

/// Feature bitset selecting a compiled shader variant.
///
/// Flags compose freely; the renderer compiles (and caches) one pipeline
/// per distinct set, so the per-vertex and per-fragment hot paths carry no
/// runtime feature branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StyleFlags(u32);

impl StyleFlags {
    /// Width in world units; segments billboard as camera-facing ribbons.
    /// Without this flag width is constant in screen pixels.
    pub const WORLD_UNITS: Self = Self(1 << 0);
    /// Per-endpoint width scales from the buffer's width stream.
    pub const VARY_WIDTH: Self = Self(1 << 1);
    /// Distance-based dashing from the buffer's distance stream.
    pub const DASHED: Self = Self(1 << 2);
    /// Per-endpoint affine (mul, add) remap before any other transform.
    pub const ENDPOINT_REMAP: Self = Self(1 << 3);
    /// Alpha from the style's mask texture instead of the analytic cap.
    pub const TEXTURED: Self = Self(1 << 4);
    /// Per-endpoint colors from the buffer's color stream.
    pub const VERTEX_COLORS: Self = Self(1 << 5);
    /// Derivative-based soft edge for alpha-to-coverage targets instead of
    /// a hard discard.
    pub const COVERAGE_AA: Self = Self(1 << 6);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for StyleFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StyleFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One per-endpoint affine remap: `p ⊙ mul + add`, component-wise.
///
/// Applied to an endpoint before the view transform, this lets one shared
/// [SegmentBuffer](crate::SegmentBuffer) be reshaped into different world
/// curves per style without re-uploading instance data (folding a flat
/// curve onto cube faces, collapsing an axis to project onto a plane, ...).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointRemap {
    pub mul: Vec3,
    pub add: Vec3,
}

impl EndpointRemap {
    pub const IDENTITY: Self = Self {
        mul: Vec3::ONE,
        add: Vec3::ZERO,
    };

    pub fn new(mul: Vec3, add: Vec3) -> Self {
        Self { mul, add }
    }

    /// Apply the remap to a point.
    pub fn apply(&self, p: Vec3) -> Vec3 {
        p * self.mul + self.add
    }
}

/// Rendering configuration for a set of line segments.
///
/// Many styles may share one segment buffer; each is an independent visual
/// variant. Mutations take effect on the next frame. The host must keep
/// [resolution](Self::resolution) in sync with the render target or
/// screen-unit widths will be wrong.
#[derive(Debug, Clone)]
pub struct LineStyle {
    flags: StyleFlags,

    /// Base diffuse color.
    pub color: Color,
    /// Base opacity, multiplied into the coverage alpha.
    pub opacity: f32,
    /// Half-width of the line: pixels in screen-unit mode, world units in
    /// world-unit mode. Multiplied by the per-endpoint width scale when
    /// [StyleFlags::VARY_WIDTH] is set.
    pub linewidth: f32,
    /// Render-target size in physical pixels.
    pub resolution: Vec2,
    /// Lengthwise quad extension past the segment ends, as a multiple of
    /// the half-width. Screen-unit mode only; 1.0 exactly covers a round
    /// cap.
    pub overshoot: f32,

    /// Distance offset added before the dash test.
    pub dash_offset: f32,
    /// Length of the drawn part of one dash period.
    pub dash_size: f32,
    /// Length of the gap part of one dash period.
    pub gap_size: f32,
    /// Scale applied to the buffer's cumulative distances.
    pub dash_scale: f32,

    /// Remap applied to segment start points when
    /// [StyleFlags::ENDPOINT_REMAP] is set.
    pub start_remap: EndpointRemap,
    /// Remap applied to segment end points.
    pub end_remap: EndpointRemap,

    /// Alpha mask sampled by [StyleFlags::TEXTURED] variants. A 1x1 opaque
    /// fallback is bound while this is `None`.
    pub alpha_map: Option<Arc<TextureView>>,
}

impl LineStyle {
    pub fn new() -> Self {
        Self {
            flags: StyleFlags::empty(),
            color: Color::WHITE,
            opacity: 1.0,
            linewidth: 1.0,
            resolution: Vec2::new(100.0, 100.0),
            overshoot: 1.0,
            dash_offset: 0.0,
            dash_size: 1.0,
            gap_size: 1.0,
            dash_scale: 1.0,
            start_remap: EndpointRemap::IDENTITY,
            end_remap: EndpointRemap::IDENTITY,
            alpha_map: None,
        }
    }

    pub fn flags(&self) -> StyleFlags {
        self.flags
    }

    /// Enable or disable a feature flag. Changing flags selects a
    /// different compiled shader variant on the next frame; previously
    /// compiled variants stay cached.
    pub fn set_flag(&mut self, flag: StyleFlags, enabled: bool) {
        self.flags.set(flag, enabled);
    }

    pub fn with_flags(mut self, flags: StyleFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_color(mut self, color: impl Into<Color>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_linewidth(mut self, linewidth: f32) -> Self {
        self.linewidth = linewidth;
        self
    }

    pub fn with_resolution(mut self, width: f32, height: f32) -> Self {
        self.resolution = Vec2::new(width, height);
        self
    }

    /// Configure dashing and enable the [StyleFlags::DASHED] variant.
    pub fn with_dashes(mut self, dash_size: f32, gap_size: f32) -> Self {
        self.dash_size = dash_size;
        self.gap_size = gap_size;
        self.flags |= StyleFlags::DASHED;
        self
    }

    /// Configure endpoint remapping and enable the
    /// [StyleFlags::ENDPOINT_REMAP] variant.
    pub fn with_remap(mut self, start: EndpointRemap, end: EndpointRemap) -> Self {
        self.start_remap = start;
        self.end_remap = end;
        self.flags |= StyleFlags::ENDPOINT_REMAP;
        self
    }

    /// Set the alpha mask and enable the [StyleFlags::TEXTURED] variant.
    pub fn with_alpha_map(mut self, texture: Arc<TextureView>) -> Self {
        self.alpha_map = Some(texture);
        self.flags |= StyleFlags::TEXTURED;
        self
    }

    /// Update the stored render-target size. Call whenever the target is
    /// resized.
    pub fn set_resolution(&mut self, width: f32, height: f32) {
        self.resolution = Vec2::new(width, height);
    }

    /// Dash period, drawn part plus gap.
    pub fn dash_period(&self) -> f32 {
        self.dash_size + self.gap_size
    }

    /// The variant actually compiled for this style, after degrading
    /// unusable combinations:
    /// - a non-positive dash period renders solid;
    /// - coverage antialiasing without a multisampled target falls back to
    ///   hard discard.
    pub(crate) fn effective_flags(&self, sample_count: u32) -> StyleFlags {
        let mut flags = self.flags;
        if flags.contains(StyleFlags::DASHED) && self.dash_period() <= 0.0 {
            flags = flags.without(StyleFlags::DASHED);
        }
        if flags.contains(StyleFlags::COVERAGE_AA) && sample_count <= 1 {
            flags = flags.without(StyleFlags::COVERAGE_AA);
        }
        flags
    }
}

impl Default for LineStyle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-style uniform data, one buffer per prepared (object, style) pair.
///
/// Field order matches the WGSL `LineUniform` struct; vec3 remap terms are
/// padded to vec4 for std140-compatible layout.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct LineUniform {
    pub diffuse: [f32; 4], // rgb + opacity
    pub start_mul: [f32; 4],
    pub start_add: [f32; 4],
    pub end_mul: [f32; 4],
    pub end_add: [f32; 4],
    pub resolution: [f32; 2],
    pub linewidth: f32,
    pub overshoot: f32,
    pub dash_offset: f32,
    pub dash_size: f32,
    pub gap_size: f32,
    pub dash_scale: f32,
}

impl LineUniform {
    pub(crate) fn from_style(style: &LineStyle) -> Self {
        let pad = |v: Vec3| [v.x, v.y, v.z, 0.0];
        Self {
            diffuse: [style.color.r, style.color.g, style.color.b, style.opacity],
            start_mul: pad(style.start_remap.mul),
            start_add: pad(style.start_remap.add),
            end_mul: pad(style.end_remap.mul),
            end_add: pad(style.end_remap.add),
            resolution: [style.resolution.x, style.resolution.y],
            linewidth: style.linewidth,
            overshoot: style.overshoot,
            dash_offset: style.dash_offset,
            dash_size: style.dash_size,
            gap_size: style.gap_size,
            dash_scale: style.dash_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_compose_and_clear() {
        let mut flags = StyleFlags::DASHED | StyleFlags::WORLD_UNITS;
        assert!(flags.contains(StyleFlags::DASHED));
        assert!(!flags.contains(StyleFlags::TEXTURED));

        flags.set(StyleFlags::DASHED, false);
        assert!(!flags.contains(StyleFlags::DASHED));
        assert!(flags.contains(StyleFlags::WORLD_UNITS));
    }

    #[test]
    fn remap_is_component_wise_multiply_then_add() {
        let remap = EndpointRemap::new(Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO);
        let p = remap.apply(Vec3::new(3.0, -2.0, 7.0));
        assert_eq!(p, Vec3::new(0.0, 0.0, 7.0));

        let shift = EndpointRemap::new(Vec3::ONE, Vec3::new(-5.0, 0.0, 0.0));
        assert_eq!(shift.apply(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(-4.0, 2.0, 3.0));
    }

    #[test]
    fn zero_dash_period_degrades_to_solid() {
        let style = LineStyle::new().with_dashes(0.0, 0.0);
        let effective = style.effective_flags(1);
        assert!(!effective.contains(StyleFlags::DASHED));

        let ok = LineStyle::new().with_dashes(2.0, 1.0);
        assert!(ok.effective_flags(1).contains(StyleFlags::DASHED));
    }

    #[test]
    fn coverage_aa_needs_multisampling() {
        let mut style = LineStyle::new();
        style.set_flag(StyleFlags::COVERAGE_AA, true);
        assert!(!style.effective_flags(1).contains(StyleFlags::COVERAGE_AA));
        assert!(style.effective_flags(4).contains(StyleFlags::COVERAGE_AA));
    }

    #[test]
    fn uniform_packs_style_values() {
        let style = LineStyle::new()
            .with_color(Color::from_rgb(0.25, 0.5, 0.75))
            .with_opacity(0.5)
            .with_linewidth(3.0)
            .with_resolution(800.0, 600.0);
        let uniform = LineUniform::from_style(&style);
        assert_eq!(uniform.diffuse, [0.25, 0.5, 0.75, 0.5]);
        assert_eq!(uniform.resolution, [800.0, 600.0]);
        assert_eq!(uniform.linewidth, 3.0);
        // Pod layout stays 16-byte aligned for uniform binding.
        assert_eq!(std::mem::size_of::<LineUniform>() % 16, 0);
    }
}
