use half::f16;
use rayon::prelude::*;
use wgpu::util::DeviceExt;

use crate::environment::EnvironmentMap;

/// The reflection environment on the GPU. Starts as a 1x1 black placeholder
/// with `mip_count == 0`, which the shader treats as "no environment".
pub struct RenderEnvironment {
    _texture: wgpu::Texture,
    pub bind_group: wgpu::BindGroup,
    pub mip_count: u32,
}

impl RenderEnvironment {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Environment bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        })
    }

    pub fn placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let black = [f16::ZERO; 4];
        let mut environment = Self::create(
            device,
            queue,
            layout,
            "Environment placeholder",
            (1, 1),
            1,
            bytemuck::cast_slice(&black),
        );
        environment.mip_count = 0;
        environment
    }

    pub fn from_map(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        map: &EnvironmentMap,
    ) -> Self {
        // Mips are stored back to back, largest first
        let texels: Vec<f16> = map
            .levels
            .par_iter()
            .flat_map_iter(|level| {
                level
                    .texels
                    .iter()
                    .flatten()
                    .map(|&channel| f16::from_f32(channel))
            })
            .collect();

        let environment = Self::create(
            device,
            queue,
            layout,
            &map.name,
            (map.width(), map.height()),
            map.mip_level_count(),
            bytemuck::cast_slice(&texels),
        );

        log::info!(
            "Uploaded environment {} ({} mip levels)",
            map.name,
            environment.mip_count
        );

        environment
    }

    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        (width, height): (u32, u32),
        mip_count: u32,
        data: &[u8],
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: mip_count,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: Self::FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            data,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Equirectangular: wraps around horizontally, clamps at the poles
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Environment bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            _texture: texture,
            bind_group,
            mip_count,
        }
    }
}
