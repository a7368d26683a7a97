use glam::{Mat4, Quat, Vec3};
use std::cell::{Cell, Ref, RefCell};

/// Local translation, rotation and scale with lazily cached matrices.
///
/// The world matrix is written by the scene during `late_update`, so reading it
/// in between a setter and the next update returns the previous frame's value.
#[derive(Debug, Clone)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,

    local_matrix: RefCell<Mat4>,
    world_matrix: RefCell<Mat4>,
    inverse_transpose_world_matrix: RefCell<Mat4>,
    local_dirty: Cell<bool>,
    world_dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_translation(Vec3::ZERO)
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            local_matrix: RefCell::new(Mat4::IDENTITY),
            world_matrix: RefCell::new(Mat4::IDENTITY),
            inverse_transpose_world_matrix: RefCell::new(Mat4::IDENTITY),
            local_dirty: Cell::new(true),
            world_dirty: Cell::new(true),
        }
    }

    pub fn get_local_matrix(&self) -> Ref<Mat4> {
        if self.local_dirty.get() {
            let matrix = Mat4::from_scale_rotation_translation(
                self.scale,
                self.rotation,
                self.translation,
            );

            self.local_matrix.replace(matrix);
            self.local_dirty.set(false);
            self.invalidate_world();
        }

        self.local_matrix.borrow()
    }

    pub fn get_world_matrix(&self) -> Ref<Mat4> {
        self.world_matrix.borrow()
    }

    /// Transforms normals and tangents under non-uniform scale.
    pub fn get_inverse_transpose_world_matrix(&self) -> Ref<Mat4> {
        self.inverse_transpose_world_matrix.borrow()
    }

    pub fn set_world_matrix(&self, world_matrix: Mat4) {
        self.world_matrix.replace(world_matrix);
        self.world_dirty.set(false);

        // A zero scale axis makes the matrix singular, keep the last good one
        if world_matrix.determinant() != 0.0 {
            self.inverse_transpose_world_matrix
                .replace(world_matrix.inverse().transpose());
        }
    }

    pub fn invalidate_local(&self) {
        self.local_dirty.set(true);
        self.world_dirty.set(true);
    }

    pub fn invalidate_world(&self) {
        self.world_dirty.set(true);
    }

    pub fn is_world_dirty(&self) -> bool {
        self.world_dirty.get()
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.invalidate_local();
    }

    pub fn set_transform(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.invalidate_local();
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_uniform_scale_is_kept_per_axis() {
        let mut transform = Transform::default();
        transform.set_transform(Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 1.0, 0.1));

        let local = *transform.get_local_matrix();
        let point = local.transform_point3(Vec3::new(0.0, 0.0, 10.0));
        assert!(point.abs_diff_eq(Vec3::new(0.0, 0.0, 1.0), 1e-6));
    }

    #[test]
    fn normals_stay_perpendicular_under_non_uniform_scale() {
        let mut transform = Transform::default();
        transform.set_transform(Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 1.0, 0.1));
        transform.set_world_matrix(*transform.get_local_matrix());

        // Surface x + z = 0 before scaling
        let tangent = Vec3::new(1.0, 0.0, -1.0);
        let normal = Vec3::new(1.0, 0.0, 1.0);

        let world = *transform.get_world_matrix();
        let normal_matrix = *transform.get_inverse_transpose_world_matrix();
        let world_tangent = world.transform_vector3(tangent);
        let world_normal = normal_matrix.transform_vector3(normal);

        assert!(world_tangent.dot(world_normal).abs() < 1e-6);
        assert!(world.transform_vector3(normal).dot(world_tangent).abs() > 0.1);
    }
}
