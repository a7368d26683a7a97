use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use wgpu::{util::DeviceExt, TexelCopyBufferLayout, TexelCopyTextureInfo, TextureDescriptor};

use crate::{
    asset_pipeline::materials::{ColorSpace, Material, TextureData, TextureId},
    material_manager::{MaterialId, MaterialManager},
};

pub struct TextureEntry {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// Linear rgb, a unused.
    pub base_color: Vec4,
    /// metalness, roughness, clearcoat, clearcoat roughness
    pub params: Vec4,
    pub env_map_intensity: f32,
    pub unlit: u32,
    pub has_normal_map: u32,
    _padding: u32,
}

impl MaterialUniform {
    pub fn from_material(material: &Material) -> Self {
        match material {
            Material::Basic(basic) => Self {
                base_color: basic.color.unwrap_or(Vec3::ONE).extend(1.0),
                params: Vec4::new(0.0, 1.0, 0.0, 0.0),
                env_map_intensity: 0.0,
                unlit: 1,
                has_normal_map: 0,
                _padding: 0,
            },
            Material::Standard(pbr) | Material::Physical(pbr) => Self {
                base_color: pbr.color.extend(1.0),
                params: Vec4::new(
                    pbr.metalness,
                    pbr.roughness,
                    pbr.clearcoat,
                    pbr.clearcoat_roughness,
                ),
                env_map_intensity: pbr.env_map_intensity,
                unlit: 0,
                has_normal_map: pbr.maps.normal.is_some() as u32,
                _padding: 0,
            },
        }
    }
}

struct RenderMaterial {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextureType {
    BaseColor,
    Normal,
    MetallicRoughness,
}

/// GPU side of the [`MaterialManager`]: one uniform buffer and bind group per
/// material, textures shared between materials.
pub struct RenderMaterialManager {
    device: wgpu::Device,
    queue: wgpu::Queue,

    textures: HashMap<TextureId, TextureEntry>,
    default_base_color: TextureEntry,
    default_normal: TextureEntry,
    default_metallic_roughness: TextureEntry,

    materials: HashMap<MaterialId, RenderMaterial>,
    synced_generation: Option<u64>,
    sampler: wgpu::Sampler,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl RenderMaterialManager {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        bind_group_layout: wgpu::BindGroupLayout,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        });

        Self {
            device: device.clone(),
            queue: queue.clone(),
            textures: HashMap::new(),
            default_base_color: Self::create_default_texture(device, queue, TextureType::BaseColor),
            default_normal: Self::create_default_texture(device, queue, TextureType::Normal),
            default_metallic_roughness: Self::create_default_texture(
                device,
                queue,
                TextureType::MetallicRoughness,
            ),
            materials: HashMap::new(),
            synced_generation: None,
            sampler,
            bind_group_layout,
        }
    }

    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    }

    /// Creates GPU resources for new materials and rewrites the uniforms
    /// whenever the manager reports a change.
    pub fn sync(&mut self, material_manager: &MaterialManager) {
        let generation = material_manager.generation();
        if self.synced_generation == Some(generation) {
            return;
        }
        self.synced_generation = Some(generation);

        for (id, material) in material_manager.materials() {
            let uniform = MaterialUniform::from_material(material);

            if let Some(render_material) = self.materials.get(&id) {
                self.queue.write_buffer(
                    &render_material.uniform_buffer,
                    0,
                    bytemuck::cast_slice(&[uniform]),
                );
                continue;
            }

            let render_material = self.create_material(material_manager, material, uniform);
            self.materials.insert(id, render_material);
        }
    }

    pub fn bind_group(&self, id: MaterialId) -> Option<&wgpu::BindGroup> {
        self.materials.get(&id).map(|material| &material.bind_group)
    }

    fn create_material(
        &mut self,
        material_manager: &MaterialManager,
        material: &Material,
        uniform: MaterialUniform,
    ) -> RenderMaterial {
        let (base_color, metallic_roughness, normal) = match material {
            Material::Basic(basic) => (basic.color_map, None, None),
            Material::Standard(pbr) | Material::Physical(pbr) => (
                pbr.maps.base_color,
                pbr.maps.metallic_roughness,
                pbr.maps.normal,
            ),
        };

        for texture_id in [base_color, metallic_roughness, normal].into_iter().flatten() {
            if self.textures.contains_key(&texture_id) {
                continue;
            }
            let Some(data) = material_manager.texture(texture_id) else {
                continue;
            };

            let max_dimension = self.device.limits().max_texture_dimension_2d;
            if !texture_fits(data.width, data.height, max_dimension) {
                log::warn!(
                    "Texture {} is {}x{}, over the {}px limit, using the default texture",
                    data.name,
                    data.width,
                    data.height,
                    max_dimension
                );
                continue;
            }

            let entry = self.create_texture(data);
            self.textures.insert(texture_id, entry);
        }

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Material uniform ({})", material.name())),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("Material bind group ({})", material.name())),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(texture_view(
                        &self.textures,
                        base_color,
                        &self.default_base_color,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(texture_view(
                        &self.textures,
                        metallic_roughness,
                        &self.default_metallic_roughness,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(texture_view(
                        &self.textures,
                        normal,
                        &self.default_normal,
                    )),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        log::debug!("Created GPU material {}", material.name());

        RenderMaterial {
            uniform_buffer,
            bind_group,
        }
    }

    fn create_texture(&self, texture_data: &TextureData) -> TextureEntry {
        let format = match texture_data.color_space {
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
        };

        let texture = self.device.create_texture_with_data(
            &self.queue,
            &TextureDescriptor {
                label: Some(&texture_data.name),
                size: wgpu::Extent3d {
                    width: texture_data.width,
                    height: texture_data.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &texture_data.pixels,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        TextureEntry {
            _texture: texture,
            view,
        }
    }

    fn create_default_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture_type: TextureType,
    ) -> TextureEntry {
        let label = format!("Default Texture ({:?})", texture_type);

        let (format, placeholder_data) = match texture_type {
            TextureType::BaseColor => (wgpu::TextureFormat::Rgba8UnormSrgb, [255u8, 255, 255, 255]),
            TextureType::Normal => (wgpu::TextureFormat::Rgba8Unorm, [128, 128, 255, 255]),
            // Factors pass through unchanged
            TextureType::MetallicRoughness => {
                (wgpu::TextureFormat::Rgba8Unorm, [255, 255, 255, 255])
            }
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &placeholder_data,
            TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        TextureEntry {
            _texture: texture,
            view,
        }
    }
}

fn texture_fits(width: u32, height: u32, max_dimension: u32) -> bool {
    width > 0 && height > 0 && width <= max_dimension && height <= max_dimension
}

fn texture_view<'a>(
    textures: &'a HashMap<TextureId, TextureEntry>,
    id: Option<TextureId>,
    fallback: &'a TextureEntry,
) -> &'a wgpu::TextureView {
    id.and_then(|id| textures.get(&id))
        .map(|entry| &entry.view)
        .unwrap_or(&fallback.view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_pipeline::{
        jewelry,
        materials::{BasicMaterial, PbrMaterial},
    };

    #[test]
    fn textures_over_the_device_limit_do_not_fit() {
        assert!(texture_fits(8192, 1, 8192));
        assert!(texture_fits(1, 1, 8192));
        assert!(!texture_fits(8193, 16, 8192));
        assert!(!texture_fits(16, 16384, 8192));
        assert!(!texture_fits(0, 16, 8192));
    }

    #[test]
    fn uniform_matches_the_shader_struct() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 48);
    }

    #[test]
    fn basic_materials_are_unlit() {
        let uniform = MaterialUniform::from_material(&Material::Basic(BasicMaterial {
            name: "Flat".to_string(),
            color: None,
            color_map: None,
        }));

        assert_eq!(uniform.unlit, 1);
        assert_eq!(uniform.base_color, Vec4::ONE);
    }

    #[test]
    fn enhanced_material_parameters_reach_the_uniform() {
        let mut material = Material::Standard(PbrMaterial {
            metalness: 0.5,
            roughness: 0.7,
            ..PbrMaterial::standard("Gold")
        });
        jewelry::enhance_material(&mut material);

        let uniform = MaterialUniform::from_material(&material);
        assert_eq!(uniform.unlit, 0);
        assert_eq!(uniform.params.x, 0.8);
        assert_eq!(uniform.params.y, 0.3);
        assert_eq!(uniform.env_map_intensity, 1.2);
        assert_eq!(uniform.has_normal_map, 0);
    }
}
