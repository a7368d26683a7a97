use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    pub fn new(point1: Vec3, point2: Vec3) -> AABB {
        let min = point1.min(point2);
        let max = point1.max(point2);
        AABB { min, max }
    }

    /// Smallest box containing all points, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<AABB> {
        points.into_iter().fold(None, |aabb, point| match aabb {
            None => Some(AABB::new(point, point)),
            Some(aabb) => Some(aabb.expanded_to(point)),
        })
    }

    pub fn expanded_to(&self, point: Vec3) -> AABB {
        AABB {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    pub fn corners(&self) -> [Vec3; 8] {
        [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ]
    }

    /// Axis-aligned box enclosing this box after `matrix` is applied to it.
    pub fn transformed(&self, matrix: &Mat4) -> AABB {
        let corners = self.corners().map(|corner| matrix.transform_point3(corner));
        // Eight corners, never empty
        AABB::from_points(corners).unwrap_or(*self)
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;

    #[test]
    fn from_points_of_nothing_is_none() {
        assert!(AABB::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn from_points_covers_all_points() {
        let points = [
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-3.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let aabb = AABB::from_points(points).unwrap();

        assert_eq!(aabb.min, Vec3::new(-3.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 2.0));
        assert!(points.iter().all(|p| aabb.contains_point(*p)));
        assert_eq!(aabb.max_dimension(), 6.0);
    }

    #[test]
    fn transformed_box_encloses_rotated_corners() {
        let aabb = AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
            Vec3::new(10.0, 0.0, 0.0),
        );

        let transformed = aabb.transformed(&matrix);
        let half_diagonal = 2.0 * std::f32::consts::SQRT_2;

        assert!(transformed
            .center()
            .abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-5));
        assert!((transformed.size().x - 2.0 * half_diagonal).abs() < 1e-4);
        assert!((transformed.size().y - 4.0).abs() < 1e-5);
    }
}
