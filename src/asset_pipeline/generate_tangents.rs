// Not every exporter writes tangents, so meshes without them get MikkTSpace
// tangents generated at load time.

use anyhow::bail;
use bevy_mikktspace::{generate_tangents, Geometry};

use crate::model::ModelPrimitive;

impl Geometry for ModelPrimitive {
    fn num_faces(&self) -> usize {
        self.indices.len() / 3
    }

    fn num_vertices_of_face(&self, _face: usize) -> usize {
        3
    }

    fn position(&self, face: usize, vert: usize) -> [f32; 3] {
        let vertex = self.vertex_by_triangle_index(face, vert);
        vertex.position.to_array()
    }

    fn normal(&self, face: usize, vert: usize) -> [f32; 3] {
        let vertex = self.vertex_by_triangle_index(face, vert);
        vertex.normal.to_array()
    }

    fn tex_coord(&self, face: usize, vert: usize) -> [f32; 2] {
        let vertex = self.vertex_by_triangle_index(face, vert);
        vertex.tex_coords.to_array()
    }

    fn set_tangent(
        &mut self,
        tangent: [f32; 3],
        _bi_tangent: [f32; 3],
        _f_mag_s: f32,
        _f_mag_t: f32,
        _bi_tangent_preserves_orientation: bool,
        face: usize,
        vert: usize,
    ) {
        let vertex = self.vertex_by_triangle_index_mut(face, vert);
        vertex.tangent = glam::Vec3::from_array(tangent).normalize_or(glam::Vec3::X);
    }
}

impl ModelPrimitive {
    /// Generates MikkTSpace tangents. Needs normals and texture coordinates.
    pub fn generate_tangents(&mut self) -> anyhow::Result<()> {
        if self.indices.len() < 3 {
            bail!("Cannot generate tangents for a primitive without triangles");
        }

        if !generate_tangents(self) {
            bail!("Failed to generate tangents for primitive {}", self.index)
        }

        Ok(())
    }

    /// Any unit vector perpendicular to the normal. Used when MikkTSpace gives
    /// up, typically because the mesh has no texture coordinates.
    pub fn fallback_tangents(&mut self) {
        for vertex in &mut self.vertices {
            vertex.tangent = vertex.normal.any_orthonormal_vector();
        }
    }
}
