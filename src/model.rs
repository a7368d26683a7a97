use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use itertools::izip;

use crate::{
    loader::GltfAsset,
    material_manager::{MaterialId, MaterialManager},
    math::bounds::AABB,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
    pub tangent: Vec3,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            tangent: Vec3::ZERO,
        }
    }
}

pub struct ModelPrimitive {
    pub index: usize,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: MaterialId,
    /// Local space.
    pub bounding_box: AABB,
}

impl ModelPrimitive {
    pub fn new(
        index: usize,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        material: MaterialId,
    ) -> anyhow::Result<Self> {
        let bounding_box = AABB::from_points(vertices.iter().map(|v| v.position))
            .ok_or_else(|| anyhow::anyhow!("Primitive {index} has no vertices"))?;

        if let Some(out_of_range) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            anyhow::bail!(
                "Primitive {index} references vertex {out_of_range}, but only has {}",
                vertices.len()
            );
        }

        Ok(Self {
            index,
            vertices,
            indices,
            material,
            bounding_box,
        })
    }

    pub fn vertex_by_triangle_index(&self, face: usize, vert: usize) -> &Vertex {
        &self.vertices[self.indices[face * 3 + vert] as usize]
    }

    pub fn vertex_by_triangle_index_mut(&mut self, face: usize, vert: usize) -> &mut Vertex {
        let index = self.indices[face * 3 + vert] as usize;
        &mut self.vertices[index]
    }

    /// Area-weighted vertex normals for meshes exported without them.
    fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.vertices.len()];

        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let (pa, pb, pc) = (
                self.vertices[a].position,
                self.vertices[b].position,
                self.vertices[c].position,
            );
            let face_normal = (pb - pa).cross(pc - pa);

            normals[a] += face_normal;
            normals[b] += face_normal;
            normals[c] += face_normal;
        }

        for (vertex, normal) in self.vertices.iter_mut().zip(normals) {
            vertex.normal = normal.normalize_or(Vec3::Y);
        }
    }
}

pub struct Model {
    pub name: String,
    pub primitives: Vec<ModelPrimitive>,
}

impl Model {
    /// Converts the triangle primitives of `mesh`. Returns `None` if there
    /// are none, as with meshes made only of lines or points.
    pub fn from_gltf(
        material_manager: &mut MaterialManager,
        asset: &GltfAsset,
        name: impl Into<String>,
        mesh: gltf::Mesh,
    ) -> anyhow::Result<Option<Model>> {
        let mut model = Model {
            name: name.into(),
            primitives: Vec::new(),
        };

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping primitive {} of {}: unsupported mode {:?}",
                    primitive.index(),
                    model.name,
                    primitive.mode()
                );
                continue;
            }

            let reader = primitive.reader(|buffer| Some(&asset.buffers[buffer.index()]));

            let positions = reader
                .read_positions()
                .ok_or_else(|| anyhow::anyhow!("Primitive without positions in {}", model.name))?
                .map(Vec3::from)
                .collect::<Vec<_>>();
            let vertex_count = positions.len();

            let normals = reader.read_normals().map(|normals| normals.map(Vec3::from));
            let has_normals = normals.is_some();
            let normals: Box<dyn Iterator<Item = Vec3>> = match normals {
                Some(normals) => Box::new(normals),
                None => Box::new(std::iter::repeat(Vec3::ZERO).take(vertex_count)),
            };

            let tex_coords: Box<dyn Iterator<Item = Vec2>> = match reader.read_tex_coords(0) {
                Some(tex_coords) => Box::new(tex_coords.into_f32().map(Vec2::from)),
                None => Box::new(std::iter::repeat(Vec2::ZERO).take(vertex_count)),
            };

            let tangents = reader
                .read_tangents()
                .map(|tangents| tangents.map(|t| Vec4::from(t).xyz()).collect::<Vec<_>>());

            let mut vertices = izip!(positions, normals, tex_coords)
                .map(|(position, normal, tex_coords)| Vertex::new(position, normal, tex_coords))
                .collect::<Vec<Vertex>>();

            if let Some(tangents) = &tangents {
                for (vertex, tangent) in vertices.iter_mut().zip(tangents) {
                    vertex.tangent = *tangent;
                }
            }

            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect::<Vec<u32>>(),
                None => (0..vertex_count as u32).collect(),
            };

            let material = material_manager.get_or_load_gltf_material(
                &asset.file_name,
                &primitive.material(),
                &asset.images,
            );

            let mut model_primitive =
                ModelPrimitive::new(primitive.index(), vertices, indices, material)?;

            if !has_normals {
                model_primitive.compute_normals();
            }

            if tangents.is_none() {
                if let Err(e) = model_primitive.generate_tangents() {
                    log::warn!("{e:#} ({}), using fallback tangents", model.name);
                    model_primitive.fallback_tangents();
                }
            }

            model.primitives.push(model_primitive);
        }

        if model.primitives.is_empty() {
            return Ok(None);
        }

        Ok(Some(model))
    }

    /// Union of the primitives' local boxes.
    pub fn bounding_box(&self) -> Option<AABB> {
        self.primitives
            .iter()
            .map(|primitive| primitive.bounding_box)
            .reduce(|a, b| a.union(&b))
    }

    pub fn material_ids(&self) -> impl Iterator<Item = MaterialId> + '_ {
        self.primitives.iter().map(|primitive| primitive.material)
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::asset_pipeline::materials::{Material, PbrMaterial};

    /// Axis-aligned box mesh spanning `min..max`, two triangles per face.
    pub fn box_model(
        materials: &mut MaterialManager,
        name: &str,
        min: Vec3,
        max: Vec3,
        material: Option<Material>,
    ) -> Model {
        let material = materials.add_material(
            material.unwrap_or_else(|| Material::Standard(PbrMaterial::standard(name))),
        );

        let vertices = AABB::new(min, max)
            .corners()
            .map(|corner| Vertex::new(corner, Vec3::Y, Vec2::ZERO))
            .to_vec();
        let indices = vec![
            0, 1, 3, 0, 3, 2, // -z
            4, 6, 7, 4, 7, 5, // +z
            0, 2, 6, 0, 6, 4, // -x
            1, 5, 7, 1, 7, 3, // +x
            0, 4, 5, 0, 5, 1, // -y
            2, 3, 7, 2, 7, 6, // +y
        ];

        Model {
            name: name.to_string(),
            primitives: vec![ModelPrimitive::new(0, vertices, indices, material).unwrap()],
        }
    }
}
