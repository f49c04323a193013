//! Line objects: a shared segment buffer drawn with one or more styles.

use core::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glam::Vec3;

use crate::line_style::{LineStyle, StyleFlags};
use crate::segment_buffer::{BufferError, SegmentBuffer};

/// Unique identifier for a line object, used to key renderer-side caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    pub(crate) fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineObject({})", self.0)
    }
}

/// How cumulative dash distances are derived from the buffer's segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMode {
    /// The buffer is one connected polyline: each segment continues the
    /// running total of the previous one.
    #[default]
    ContinuousPath,
    /// The buffer holds disjoint segments: each starts at distance zero.
    IndependentSegments,
}

/// Shareable handle to a [SegmentBuffer].
///
/// Multiple line objects (and styles) may reference the same buffer to
/// render it in different visual variants. Reads are shared; writes follow
/// a single-writer discipline, which the lock enforces for multi-threaded
/// hosts and which reduces to "don't mutate mid-draw" in a single-threaded
/// one.
#[derive(Clone)]
pub struct SharedSegmentBuffer {
    inner: Arc<RwLock<SegmentBuffer>>,
}

impl SharedSegmentBuffer {
    pub fn new(buffer: SegmentBuffer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(buffer)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, SegmentBuffer> {
        self.inner.read().unwrap()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, SegmentBuffer> {
        self.inner.write().unwrap()
    }

    /// Stable identity of the underlying buffer, for cache keying.
    pub(crate) fn buffer_key(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }
}

impl Default for SharedSegmentBuffer {
    fn default() -> Self {
        Self::new(SegmentBuffer::new())
    }
}

/// A renderable set of line segments: one shared buffer plus the styles
/// applied to its geometry groups.
///
/// Group `style_index` N selects `styles[N]`; a buffer with no groups is
/// drawn once, entirely, with style 0.
pub struct LineObject {
    /// Unique identifier for this object.
    pub id: ObjectId,
    buffer: SharedSegmentBuffer,
    /// Styles addressed by the buffer's geometry groups.
    pub styles: Vec<LineStyle>,
    /// Draw-order integer consumed by the external renderer; lower orders
    /// draw first.
    pub render_order: i32,
    distance_mode: DistanceMode,
}

impl LineObject {
    /// Create an object drawing `buffer` with a single style.
    pub fn new(buffer: SharedSegmentBuffer, style: LineStyle) -> Self {
        Self::with_styles(buffer, vec![style])
    }

    /// Create an object with one style per geometry group.
    pub fn with_styles(buffer: SharedSegmentBuffer, styles: Vec<LineStyle>) -> Self {
        Self {
            id: ObjectId::new(),
            buffer,
            styles,
            render_order: 0,
            distance_mode: DistanceMode::default(),
        }
    }

    pub fn buffer(&self) -> &SharedSegmentBuffer {
        &self.buffer
    }

    pub fn distance_mode(&self) -> DistanceMode {
        self.distance_mode
    }

    pub fn set_distance_mode(&mut self, mode: DistanceMode) {
        self.distance_mode = mode;
    }

    pub fn set_render_order(&mut self, order: i32) {
        self.render_order = order;
    }

    /// Whether any of this object's styles needs dash distances.
    pub fn any_style_dashed(&self) -> bool {
        self.styles
            .iter()
            .any(|s| s.flags().contains(StyleFlags::DASHED))
    }

    /// Replace the buffer's positions and, when any style dashes, refresh
    /// the derived distance stream. Distance recomputation is skipped for
    /// purely solid objects (an optimization, not a correctness
    /// requirement).
    pub fn set_positions(&self, points: &[f32]) -> Result<(), BufferError> {
        self.buffer.write().set_positions(points)?;
        if self.any_style_dashed() {
            self.compute_line_distances()?;
        }
        Ok(())
    }

    /// Walk the buffer's segments in order and write one cumulative
    /// distance per endpoint into the distance stream. Returns the total
    /// accumulated length.
    ///
    /// In [DistanceMode::ContinuousPath] each segment's start distance is
    /// the previous segment's end distance; in
    /// [DistanceMode::IndependentSegments] every segment restarts at zero
    /// (the returned total is then the longest single segment).
    pub fn compute_line_distances(&self) -> Result<f32, BufferError> {
        let mut buffer = self.buffer.write();
        let count = buffer.instance_count();

        let mut distances = Vec::with_capacity(count * 2);
        let mut running = 0.0f32;
        let mut total = 0.0f32;
        for i in 0..count {
            // Instance count bounds the index, so the segment exists.
            let Some((start, end)) = buffer.segment(i) else {
                break;
            };
            let length = segment_length(start, end);
            match self.distance_mode {
                DistanceMode::ContinuousPath => {
                    distances.push(running);
                    running += length;
                    distances.push(running);
                    total = running;
                }
                DistanceMode::IndependentSegments => {
                    distances.push(0.0);
                    distances.push(length);
                    total = total.max(length);
                }
            }
        }
        buffer.set_distances(&distances)?;
        Ok(total)
    }
}

fn segment_length(start: Vec3, end: Vec3) -> f32 {
    start.distance(end)
}
