use crate::Vec3;

/// Axis-aligned bounding box over accumulated points.
///
/// Starts inverted (`EMPTY`) so that growing by the first point always
/// produces a valid box. Scene loaders grow one of these per mesh and the
/// scene graph unions them for world bounds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Inverted box that contains nothing; any `grow` fixes it up.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Tight box around a point set; `EMPTY` for an empty set.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut aabb = Self::EMPTY;
        for p in points {
            aabb.grow(p);
        }
        aabb
    }

    /// Expand to include a single point.
    pub fn grow(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// True until at least one point has been grown in.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Diagonal length, used for scene-scale heuristics in reports.
    pub fn size(&self) -> f32 {
        self.extent().length()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_grows_to_point() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());

        aabb.grow(Vec3::new(1.0, 2.0, 3.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.min, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_from_points() {
        let aabb = Aabb::from_points(vec![
            Vec3::new(-1.0, 5.0, 0.0),
            Vec3::new(3.0, -2.0, 1.0),
            Vec3::new(0.0, 0.0, 7.0),
        ]);

        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(3.0, 5.0, 7.0));
    }

    #[test]
    fn test_union() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(2.0, 2.0, 2.0), Vec3::new(3.0, 3.0, 3.0));
        let u = a.union(&b);

        assert_eq!(u.min, Vec3::ZERO);
        assert_eq!(u.max, Vec3::new(3.0, 3.0, 3.0));
    }

    #[test]
    fn test_union_with_empty_is_identity() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let u = a.union(&Aabb::EMPTY);

        assert_eq!(u, a);
    }

    #[test]
    fn test_center_and_extent() {
        let aabb = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 4.0, 2.0));

        assert_eq!(aabb.center(), Vec3::new(5.0, 2.0, 1.0));
        assert_eq!(aabb.extent(), Vec3::new(10.0, 4.0, 2.0));
        assert_eq!(Aabb::EMPTY.extent(), Vec3::ZERO);
    }
}
