use std::collections::HashMap;

use anyhow::{bail, Context};
use glam::{Vec4, Vec4Swizzles};
use id_arena::{Arena, Id};

use crate::asset_pipeline::{
    jewelry,
    materials::{
        BasicMaterial, ColorSpace, Material, MaterialMaps, PbrMaterial, TextureData, TextureId,
    },
};

/// `material: None` is the default material glTF primitives fall back to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GltfMaterialKey {
    pub file_name: String,
    pub material: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GltfTextureKey {
    file_name: String,
    image: usize,
    color_space: ColorSpace,
}

pub type MaterialId = Id<Material>;

pub struct MaterialManager {
    materials: Arena<Material>,
    textures: Arena<TextureData>,
    materials_by_gltf: HashMap<GltfMaterialKey, MaterialId>,
    textures_by_gltf: HashMap<GltfTextureKey, TextureId>,
    /// Bumped whenever a material is added or changed.
    generation: u64,
}

impl MaterialManager {
    pub fn new() -> Self {
        Self {
            materials: Arena::new(),
            textures: Arena::new(),
            materials_by_gltf: HashMap::new(),
            textures_by_gltf: HashMap::new(),
            generation: 0,
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.generation += 1;
        self.materials.alloc(material)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&TextureData> {
        self.textures.get(id)
    }

    /// Returns the material for a glTF primitive, converting it on first use.
    /// Textures that can't be converted are left out of the material.
    pub fn get_or_load_gltf_material(
        &mut self,
        file_name: &str,
        material: &gltf::Material,
        images: &[gltf::image::Data],
    ) -> MaterialId {
        let key = GltfMaterialKey {
            file_name: file_name.to_string(),
            material: material.index(),
        };

        if let Some(id) = self.materials_by_gltf.get(&key) {
            return *id;
        }

        let converted = self.convert_gltf_material(file_name, material, images);
        let id = self.add_material(converted);
        self.materials_by_gltf.insert(key, id);

        id
    }

    fn convert_gltf_material(
        &mut self,
        file_name: &str,
        material: &gltf::Material,
        images: &[gltf::image::Data],
    ) -> Material {
        let name = match (material.name(), material.index()) {
            (Some(name), _) => name.to_string(),
            (None, Some(index)) => format!("Material {index}"),
            (None, None) => "Default material".to_string(),
        };

        let pbr = material.pbr_metallic_roughness();
        let color = Vec4::from(pbr.base_color_factor()).xyz();

        let base_color = pbr.base_color_texture().and_then(|info| {
            self.load_gltf_texture(file_name, &info.texture(), ColorSpace::Srgb, images)
        });

        if material.unlit() {
            return Material::Basic(BasicMaterial {
                name,
                color: Some(color),
                color_map: base_color,
            });
        }

        let metallic_roughness = pbr.metallic_roughness_texture().and_then(|info| {
            self.load_gltf_texture(file_name, &info.texture(), ColorSpace::Linear, images)
        });

        let normal = material.normal_texture().and_then(|normal| {
            self.load_gltf_texture(file_name, &normal.texture(), ColorSpace::Linear, images)
        });

        let pbr_material = PbrMaterial {
            color,
            metalness: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            maps: MaterialMaps {
                base_color,
                metallic_roughness,
                normal,
            },
            ..PbrMaterial::standard(name)
        };

        // These extensions need the physical shading model to be represented at all
        let needs_physical = material.transmission().is_some()
            || material.ior().is_some()
            || material.specular().is_some();

        if needs_physical {
            Material::Physical(pbr_material)
        } else {
            Material::Standard(pbr_material)
        }
    }

    fn load_gltf_texture(
        &mut self,
        file_name: &str,
        texture: &gltf::Texture,
        color_space: ColorSpace,
        images: &[gltf::image::Data],
    ) -> Option<TextureId> {
        match self.try_load_gltf_texture(file_name, texture, color_space, images) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("{e:#}, using the default texture");
                None
            }
        }
    }

    fn try_load_gltf_texture(
        &mut self,
        file_name: &str,
        texture: &gltf::Texture,
        color_space: ColorSpace,
        images: &[gltf::image::Data],
    ) -> anyhow::Result<TextureId> {
        let image_index = texture.source().index();
        let key = GltfTextureKey {
            file_name: file_name.to_string(),
            image: image_index,
            color_space,
        };

        if let Some(id) = self.textures_by_gltf.get(&key) {
            return Ok(*id);
        }

        let Some(image) = images.get(image_index) else {
            bail!("glTF image index {image_index} out of bounds in {file_name}");
        };

        let name = texture
            .source()
            .name()
            .map(String::from)
            .unwrap_or_else(|| format!("{file_name} (image {image_index})"));

        let texture_data = TextureData {
            name,
            width: image.width,
            height: image.height,
            pixels: convert_image_data_to_rgba(image)
                .with_context(|| format!("Failed to convert image {image_index} of {file_name}"))?,
            color_space,
        };

        let id = self.textures.alloc(texture_data);
        self.textures_by_gltf.insert(key, id);

        Ok(id)
    }

    /// Applies the jewelry upgrade to each listed material. Duplicates are fine.
    pub fn enhance_for_jewelry(&mut self, ids: impl IntoIterator<Item = MaterialId>) {
        self.generation += 1;

        for id in ids {
            if let Some(material) = self.materials.get_mut(id) {
                jewelry::enhance_material(material);
                log::debug!("Enhanced material for: {}", material.name());
            }
        }
    }

    pub fn materials(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials.iter()
    }
}

/// Expands any 8 or 16 bit glTF image to RGBA8. Two channel images are
/// luminance + alpha.
fn convert_image_data_to_rgba(data: &gltf::image::Data) -> anyhow::Result<Vec<u8>> {
    use gltf::image::Format;

    let (channels, bytes_per_channel) = match data.format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        other => bail!("Unsupported image format: {:?}", other),
    };

    let expected = data.width as usize * data.height as usize * channels * bytes_per_channel;
    if data.pixels.len() != expected {
        bail!(
            "{}x{} {:?} image has {} bytes, expected {}",
            data.width,
            data.height,
            data.format,
            data.pixels.len(),
            expected
        );
    }

    // 16 bit channels are stored in native byte order, keep the high byte
    let narrowed = match bytes_per_channel {
        2 => data
            .pixels
            .chunks_exact(2)
            .map(|c| (u16::from_ne_bytes([c[0], c[1]]) >> 8) as u8)
            .collect::<Vec<u8>>(),
        _ => data.pixels.clone(),
    };

    let pixels = match channels {
        4 => narrowed,
        3 => narrowed
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        2 => narrowed
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        _ => narrowed.iter().flat_map(|&l| [l, l, l, 255]).collect(),
    };

    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_util::{asset_from_glb, glb_from_json};

    fn image(format: gltf::image::Format, pixels: Vec<u8>) -> gltf::image::Data {
        gltf::image::Data {
            pixels,
            format,
            width: 2,
            height: 1,
        }
    }

    /// One primitive per material, plus a last one without a material.
    const MATERIALS_JSON: &str = r#"{
        "asset": { "version": "2.0" },
        "extensionsUsed": [
            "KHR_materials_unlit",
            "KHR_materials_transmission",
            "KHR_materials_ior",
            "KHR_materials_specular"
        ],
        "materials": [
            { "name": "Flat", "extensions": { "KHR_materials_unlit": {} } },
            { "name": "Glass", "extensions": { "KHR_materials_transmission": { "transmissionFactor": 0.8 } } },
            { "name": "Gem", "extensions": { "KHR_materials_ior": { "ior": 2.4 } } },
            { "name": "Lacquer", "extensions": { "KHR_materials_specular": { "specularFactor": 0.5 } } },
            { "name": "Gold", "pbrMetallicRoughness": { "metallicFactor": 0.9, "roughnessFactor": 0.2 } }
        ],
        "meshes": [{ "primitives": [
            { "attributes": { "POSITION": 0 }, "material": 0 },
            { "attributes": { "POSITION": 0 }, "material": 1 },
            { "attributes": { "POSITION": 0 }, "material": 2 },
            { "attributes": { "POSITION": 0 }, "material": 3 },
            { "attributes": { "POSITION": 0 }, "material": 4 },
            { "attributes": { "POSITION": 0 } }
        ] }],
        "buffers": [{ "byteLength": 42 }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 2, 0] }
        ]
    }"#;

    fn load_all(manager: &mut MaterialManager) -> Vec<Material> {
        let asset = asset_from_glb("materials.glb", glb_from_json(MATERIALS_JSON));
        let mesh = asset.document.meshes().next().unwrap();

        mesh.primitives()
            .map(|primitive| {
                let id = manager.get_or_load_gltf_material(
                    &asset.file_name,
                    &primitive.material(),
                    &asset.images,
                );
                manager.get(id).unwrap().clone()
            })
            .collect()
    }

    #[test]
    fn gltf_materials_pick_the_matching_shading_model() {
        let mut manager = MaterialManager::new();
        let materials = load_all(&mut manager);

        assert!(matches!(&materials[0], Material::Basic(basic) if basic.name == "Flat"));
        for physical in &materials[1..4] {
            assert!(
                matches!(physical, Material::Physical(_)),
                "{} should be physical",
                physical.name()
            );
        }

        let Material::Standard(gold) = &materials[4] else {
            panic!("expected a standard material");
        };
        assert_eq!(gold.metalness, 0.9);
        assert_eq!(gold.roughness, 0.2);
    }

    #[test]
    fn primitives_without_a_material_get_the_gltf_default() {
        let mut manager = MaterialManager::new();
        let materials = load_all(&mut manager);

        let Material::Standard(default) = &materials[5] else {
            panic!("expected a standard material");
        };
        assert_eq!(default.name, "Default material");
        assert_eq!(default.color, glam::Vec3::ONE);
        assert_eq!(default.metalness, 1.0);
        assert_eq!(default.roughness, 1.0);
        assert_eq!(default.env_map_intensity, 1.0);
    }

    #[test]
    fn gltf_materials_are_converted_once() {
        let mut manager = MaterialManager::new();
        load_all(&mut manager);
        let generation = manager.generation();

        load_all(&mut manager);

        assert_eq!(manager.materials().count(), 6);
        assert_eq!(manager.generation(), generation);
    }

    #[test]
    fn unusable_textures_fall_back_to_the_default() {
        let json = r#"{
            "asset": { "version": "2.0" },
            "images": [{ "uri": "missing.png" }],
            "textures": [{ "source": 0 }],
            "materials": [{
                "name": "Textured",
                "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
                "normalTexture": { "index": 0 }
            }]
        }"#;
        let document = gltf::Gltf::from_slice(json.as_bytes()).unwrap().document;
        let material = document.materials().next().unwrap();

        let mut manager = MaterialManager::new();
        let id = manager.get_or_load_gltf_material("textured.gltf", &material, &[]);

        let pbr = manager.get(id).and_then(Material::pbr).unwrap();
        assert_eq!(pbr.name, "Textured");
        assert!(pbr.maps.base_color.is_none());
        assert!(pbr.maps.normal.is_none());
    }

    #[test]
    fn enhancing_a_shared_material_twice_is_stable() {
        let mut manager = MaterialManager::new();
        let id = manager.add_material(Material::Standard(PbrMaterial {
            metalness: 0.5,
            ..PbrMaterial::standard("Shared")
        }));

        manager.enhance_for_jewelry([id, id]);

        let pbr = manager.get(id).and_then(Material::pbr).unwrap();
        assert_eq!(pbr.metalness, jewelry::MIN_METALNESS);
    }

    #[test]
    fn generation_moves_on_every_change() {
        let mut manager = MaterialManager::new();
        let start = manager.generation();

        let id = manager.add_material(Material::Standard(PbrMaterial::standard("A")));
        let added = manager.generation();
        assert!(added > start);

        manager.enhance_for_jewelry([id]);
        assert!(manager.generation() > added);
    }

    #[test]
    fn rgb_images_gain_an_opaque_alpha() {
        let data = image(gltf::image::Format::R8G8B8, vec![1, 2, 3, 4, 5, 6]);

        let rgba = convert_image_data_to_rgba(&data).unwrap();
        assert_eq!(rgba, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn two_channel_images_are_luminance_alpha() {
        let data = image(gltf::image::Format::R8G8, vec![10, 200, 30, 40]);

        let rgba = convert_image_data_to_rgba(&data).unwrap();
        assert_eq!(rgba, vec![10, 10, 10, 200, 30, 30, 30, 40]);
    }

    #[test]
    fn sixteen_bit_images_keep_the_high_byte() {
        let pixels = [0xffffu16, 0x8000, 0x00ff, 0x1234, 0, 0x7fff, 0xabcd, 0xffff]
            .iter()
            .flat_map(|c| c.to_ne_bytes())
            .collect();
        let data = image(gltf::image::Format::R16G16B16A16, pixels);

        let rgba = convert_image_data_to_rgba(&data).unwrap();
        assert_eq!(rgba, vec![0xff, 0x80, 0x00, 0x12, 0x00, 0x7f, 0xab, 0xff]);
    }

    #[test]
    fn float_and_truncated_images_are_rejected() {
        let float = image(gltf::image::Format::R32G32B32A32FLOAT, vec![0; 32]);
        assert!(convert_image_data_to_rgba(&float).is_err());

        let truncated = image(gltf::image::Format::R8G8B8A8, vec![0; 7]);
        assert!(convert_image_data_to_rgba(&truncated).is_err());
    }
}
