//! A GPU-accelerated 3D polyline renderer for Iced.
//!
//! - Arbitrarily many line segments with per-segment width, color, and
//!   distance-based dashing, antialiased and perspective-correct
//! - One shared 6-vertex template expanded per instance on the GPU, so
//!   replacing segment data never re-tessellates anything
//! - Pixel-exact (screen-unit) or perspective-scaled (world-unit) widths,
//!   with near-plane trimming for segments crossing the eye plane
//! - Endpoint remapping to reshape one shared buffer into different world
//!   curves per style, without touching instance data
//! - Retains GPU buffers and compiled shader variants between frames
//!
//! Quick start:
//!
//! ```no_run
//! use iced_polyline::{LineObject, LineStyle, SharedSegmentBuffer};
//!
//! let buffer = SharedSegmentBuffer::default();
//! let style = LineStyle::new()
//!     .with_linewidth(3.0)
//!     .with_resolution(1920.0, 1080.0)
//!     .with_color(iced_polyline::Color::from_rgb(0.2, 0.6, 1.0));
//!
//! let object = LineObject::new(buffer, style);
//! object
//!     .set_positions(&[
//!         -1.0, 0.0, 0.0, 1.0, 0.0, 0.0, //
//!         1.0, 0.0, 0.0, 1.0, 1.0, 0.0,
//!     ])
//!     .unwrap();
//! ```
//!
//! Each frame, the host's render loop hands its device and encoder to
//! [LineRenderer::prepare_frame] and [LineRenderer::encode]; see the
//! `line_renderer` module docs.
pub mod camera;
pub mod expand;
pub mod line_object;
pub mod line_renderer;
pub mod line_style;
pub mod segment_buffer;

// Iced re-exports.
pub use iced::Color;

// Re-exports of public types.
pub use camera::Camera;
pub use expand::{Coverage, ExpandedVertex, FragmentInput, Segment};
pub use line_object::{DistanceMode, LineObject, ObjectId, SharedSegmentBuffer};
pub use line_renderer::{LineRenderer, RenderParams};
pub use line_style::{EndpointRemap, LineStyle, StyleFlags};
pub use segment_buffer::{
    BoundingBox, BoundingSphere, BufferError, GeometryGroup, SegmentBuffer,
};
