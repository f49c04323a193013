use glam::{Mat4, Vec3, Vec4};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CameraUniform {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl CameraUniform {
    pub(crate) fn update(&mut self, camera: &Camera) {
        self.view = camera.view.to_cols_array_2d();
        self.projection = camera.projection.to_cols_array_2d();
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY.to_cols_array_2d(),
            projection: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

/// The view of the external camera, as the line expansion needs it.
///
/// The host owns camera motion and projection policy; this type only
/// carries the two matrices and the derived quantities the expansion uses
/// (perspective detection and the conservative near-plane estimate for
/// segment trimming).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World-to-view transform.
    pub view: Mat4,
    /// View-to-clip transform.
    pub projection: Mat4,
}

impl Camera {
    /// Identity view with the given projection.
    pub fn new(projection: Mat4) -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection,
        }
    }

    /// Right-handed perspective camera.
    pub fn perspective(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::new(Mat4::perspective_rh(fov_y_radians, aspect, near, far))
    }

    /// Right-handed orthographic camera.
    pub fn orthographic(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self::new(Mat4::orthographic_rh(left, right, bottom, top, near, far))
    }

    /// Position the camera at `eye` looking at `target`.
    pub fn look_at(mut self, eye: Vec3, target: Vec3, up: Vec3) -> Self {
        self.view = Mat4::look_at_rh(eye, target, up);
        self
    }

    /// Whether the projection is perspective (clip w depends on view z).
    pub fn is_perspective(&self) -> bool {
        self.projection.z_axis.w == -1.0
    }

    /// Conservative near-plane estimate derived from the projection
    /// matrix, used to trim segments that straddle the eye plane. Lands
    /// between the camera plane and the true near plane.
    pub fn near_estimate(&self) -> f32 {
        let a = self.projection.z_axis.z;
        let b = self.projection.w_axis.z;
        -0.5 * b / a
    }

    /// Transform a world-space point into view space.
    pub fn view_point(&self, p: Vec3) -> Vec3 {
        self.view.transform_point3(p)
    }

    /// Project a view-space point into clip space.
    pub fn clip_from_view(&self, p: Vec3) -> Vec4 {
        self.projection * p.extend(1.0)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}
