// Transform utilities for Mat4
//
// Extends glam::Mat4 with the checks and conversions the scene loaders
// need when stitching node hierarchies together.

use crate::Aabb;
use glam::{Mat4, Vec3};

/// Extension trait for Mat4 with scene-assembly helpers.
pub trait Mat4Ext {
    /// Transform an axis-aligned bounding box by transforming all 8
    /// corners and re-bounding them. Empty boxes stay empty.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;

    /// Whether the matrix is the identity to within `epsilon` per element.
    /// Loaders use this to skip emitting no-op transform nodes.
    fn is_near_identity(&self, epsilon: f32) -> bool;
}

impl Mat4Ext for Mat4 {
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        let corners = [
            Vec3::new(aabb.min.x, aabb.min.y, aabb.min.z),
            Vec3::new(aabb.max.x, aabb.min.y, aabb.min.z),
            Vec3::new(aabb.min.x, aabb.max.y, aabb.min.z),
            Vec3::new(aabb.max.x, aabb.max.y, aabb.min.z),
            Vec3::new(aabb.min.x, aabb.min.y, aabb.max.z),
            Vec3::new(aabb.max.x, aabb.min.y, aabb.max.z),
            Vec3::new(aabb.min.x, aabb.max.y, aabb.max.z),
            Vec3::new(aabb.max.x, aabb.max.y, aabb.max.z),
        ];

        Aabb::from_points(corners.iter().map(|&c| self.transform_point3(c)))
    }

    fn is_near_identity(&self, epsilon: f32) -> bool {
        let diff = *self - Mat4::IDENTITY;
        diff.to_cols_array().iter().all(|v| v.abs() <= epsilon)
    }
}
