use nalgebra::{Matrix4, Point3, Rotation3, Unit, Vector3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Perspective camera looking at the volume, which sits centred on the world
/// origin.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 2.5),
            target: Point3::origin(),
            up: Vector3::y(),
            fov: 45.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Per-frame matrices derived from a [`Camera`].
#[derive(Clone, Copy, Debug)]
pub struct CameraMatrices {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub inverse_view_projection: Matrix4<f32>,
}

impl CameraMatrices {
    /// World-space points where the ray through an NDC position crosses the
    /// near and far planes.
    pub fn unproject(&self, ndc_x: f32, ndc_y: f32) -> (Point3<f32>, Point3<f32>) {
        let near = self
            .inverse_view_projection
            .transform_point(&Point3::new(ndc_x, ndc_y, -1.0));
        let far = self
            .inverse_view_projection
            .transform_point(&Point3::new(ndc_x, ndc_y, 1.0));
        (near, far)
    }
}

impl Camera {
    pub fn is_valid(&self) -> bool {
        let forward = self.target - self.position;
        self.fov > 0.0
            && self.fov < 180.0
            && self.near > 0.0
            && self.near < self.far
            && forward.norm() > f32::EPSILON
            && forward.cross(&self.up).norm() > f32::EPSILON
    }

    /// Build view and projection matrices for an output aspect ratio. Returns
    /// `None` for a degenerate camera.
    pub fn matrices(&self, aspect: f32) -> Option<CameraMatrices> {
        if !self.is_valid() || !(aspect.is_finite() && aspect > 0.0) {
            return None;
        }
        let view = Matrix4::look_at_rh(&self.position, &self.target, &self.up);
        let projection =
            Matrix4::new_perspective(aspect, self.fov.to_radians(), self.near, self.far);
        let inverse_view_projection = (projection * view).try_inverse()?;
        Some(CameraMatrices {
            view,
            projection,
            inverse_view_projection,
        })
    }

    /// Unit vector from the camera towards its target.
    pub fn forward(&self) -> Vector3<f32> {
        (self.target - self.position).normalize()
    }

    /// Rotate the camera around its target. Angles are radians.
    pub fn orbited(&self, yaw: f32, pitch: f32) -> Camera {
        let offset = self.position - self.target;
        let yaw_rotation = Rotation3::from_axis_angle(&Unit::new_normalize(self.up), yaw);
        let right = offset.cross(&self.up);
        let pitch_rotation = match Unit::try_new(right, f32::EPSILON) {
            Some(axis) => Rotation3::from_axis_angle(&axis, pitch),
            None => Rotation3::identity(),
        };
        let rotation = yaw_rotation * pitch_rotation;
        Camera {
            position: self.target + rotation * offset,
            up: rotation * self.up,
            ..*self
        }
    }

    /// Move the camera along its view direction by a distance factor.
    pub fn dollied(&self, factor: f32) -> Camera {
        let offset = self.position - self.target;
        let factor = if factor.is_finite() && factor > 0.0 {
            factor
        } else {
            1.0
        };
        Camera {
            position: self.target + offset * factor,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn centre_ray_points_at_target() {
        let camera = Camera::default();
        let matrices = camera.matrices(1.0).unwrap();
        let (near, far) = matrices.unproject(0.0, 0.0);
        let direction = (far - near).normalize();
        assert_relative_eq!(direction, camera.forward(), epsilon = 1e-4);
        assert_relative_eq!((near - camera.position).norm(), camera.near, epsilon = 1e-3);
    }

    #[test]
    fn degenerate_cameras_have_no_matrices() {
        let same_point = Camera {
            target: Point3::new(0.0, 0.0, 2.5),
            ..Camera::default()
        };
        let flat_fov = Camera {
            fov: 180.0,
            ..Camera::default()
        };
        let parallel_up = Camera {
            up: Vector3::z(),
            ..Camera::default()
        };
        assert!(same_point.matrices(1.0).is_none());
        assert!(flat_fov.matrices(1.0).is_none());
        assert!(parallel_up.matrices(1.0).is_none());
        assert!(Camera::default().matrices(0.0).is_none());
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let camera = Camera::default();
        let moved = camera.orbited(0.7, 0.3);
        assert_relative_eq!(
            (moved.position - moved.target).norm(),
            (camera.position - camera.target).norm(),
            epsilon = 1e-5
        );
    }
}
