//! Renderable vertex and primitive classification shared by the loaders.

use relic_math::{Vec2, Vec3, Vec4};

/// One vertex of an emitted primitive.
///
/// Only the position is guaranteed. Every other attribute is valid
/// independently of the rest; absent attributes are `None`, never a
/// sentinel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub uv: Option<Vec2>,
    pub color: Option<Vec4>,
}

impl Vertex {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            normal: None,
            uv: None,
            color: None,
        }
    }

    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = Some(normal);
        self
    }

    pub fn with_uv(mut self, uv: Vec2) -> Self {
        self.uv = Some(uv);
        self
    }

    pub fn with_color(mut self, color: Vec4) -> Self {
        self.color = Some(color);
        self
    }
}

/// How the vertices of one primitive are assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
}

impl PrimitiveKind {
    /// Assembly for a single filled face with `n` vertices.
    pub fn for_face_vertex_count(n: usize) -> PrimitiveKind {
        match n {
            0 | 1 => PrimitiveKind::Points,
            2 => PrimitiveKind::Lines,
            3 => PrimitiveKind::Triangles,
            4 => PrimitiveKind::Quads,
            _ => PrimitiveKind::Polygon,
        }
    }

    /// Number of triangles the primitive rasterizes to, for statistics.
    pub fn triangle_estimate(self, vertex_count: usize) -> usize {
        match self {
            PrimitiveKind::Triangles => vertex_count / 3,
            PrimitiveKind::TriangleStrip | PrimitiveKind::TriangleFan | PrimitiveKind::Polygon => {
                vertex_count.saturating_sub(2)
            }
            PrimitiveKind::Quads => (vertex_count / 4) * 2,
            PrimitiveKind::QuadStrip => {
                if vertex_count < 4 {
                    0
                } else {
                    (vertex_count - 2) / 2 * 2
                }
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_attributes_are_independent() {
        let v = Vertex::at(Vec3::ONE).with_uv(Vec2::new(0.5, 0.5));
        assert!(v.normal.is_none());
        assert!(v.uv.is_some());
        assert!(v.color.is_none());
    }

    #[test]
    fn test_face_kind_from_vertex_count() {
        assert_eq!(
            PrimitiveKind::for_face_vertex_count(1),
            PrimitiveKind::Points
        );
        assert_eq!(PrimitiveKind::for_face_vertex_count(2), PrimitiveKind::Lines);
        assert_eq!(
            PrimitiveKind::for_face_vertex_count(3),
            PrimitiveKind::Triangles
        );
        assert_eq!(PrimitiveKind::for_face_vertex_count(4), PrimitiveKind::Quads);
        assert_eq!(
            PrimitiveKind::for_face_vertex_count(7),
            PrimitiveKind::Polygon
        );
    }

    #[test]
    fn test_triangle_estimates() {
        assert_eq!(PrimitiveKind::Triangles.triangle_estimate(6), 2);
        assert_eq!(PrimitiveKind::TriangleStrip.triangle_estimate(5), 3);
        assert_eq!(PrimitiveKind::TriangleFan.triangle_estimate(4), 2);
        assert_eq!(PrimitiveKind::Quads.triangle_estimate(8), 4);
        assert_eq!(PrimitiveKind::Points.triangle_estimate(9), 0);
    }
}
