use std::sync::RwLock;

use anyhow::Context;
use wgpu::SurfaceConfiguration;
use winit::dpi::PhysicalSize;

use crate::{
    config::RenderConfig,
    lighting::LightRig,
    rendering::{
        global_uniform::{GlobalUniform, GlobalUniformState},
        render_environment::RenderEnvironment,
        render_material_manager::RenderMaterialManager,
    },
};

/// State shared by every pass: surface format, uniforms and the bind group
/// layouts the pipelines are built against.
pub struct RenderCommon {
    pub output_surface_config: RwLock<SurfaceConfiguration>,
    pub msaa_samples: u32,
    pub clear_color: wgpu::Color,

    pub camera_uniform_buffer: wgpu::Buffer,
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
    pub camera_bind_group: wgpu::BindGroup,

    pub global_uniform: GlobalUniform,
    pub environment_bind_group_layout: wgpu::BindGroupLayout,
    pub material_bind_group_layout: wgpu::BindGroupLayout,
}

impl RenderCommon {
    /// Scene colour is rendered in linear HDR and tone mapped to the surface.
    pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(
        device: &wgpu::Device,
        adapter: &wgpu::Adapter,
        surface: &wgpu::Surface,
        size: PhysicalSize<u32>,
        camera_uniform_buffer: wgpu::Buffer,
        config: &RenderConfig,
        lights: &LightRig,
    ) -> anyhow::Result<Self> {
        let surface_caps = surface.get_capabilities(adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("Surface reports no supported formats")?;

        if !surface_format.is_srgb() {
            log::warn!("No sRGB surface format available, using {surface_format:?}");
        }

        let output_surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(device, &output_surface_config);

        let msaa_samples = supported_sample_count(adapter, config.msaa_samples);

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("camera_bind_group_layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bind_group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_uniform_buffer.as_entire_binding(),
            }],
        });

        let global_uniform =
            GlobalUniform::new(device, GlobalUniformState::new(size, 0.0, config, lights, 0));

        Ok(Self {
            output_surface_config: RwLock::new(output_surface_config),
            msaa_samples,
            clear_color: config.clear_color,
            camera_uniform_buffer,
            camera_bind_group_layout,
            camera_bind_group,
            global_uniform,
            environment_bind_group_layout: RenderEnvironment::create_bind_group_layout(device),
            material_bind_group_layout: RenderMaterialManager::create_bind_group_layout(device),
        })
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.output_surface_config
            .read()
            .map(|config| config.format)
            .unwrap_or_else(|poisoned| poisoned.into_inner().format)
    }
}

/// Falls back to the highest sample count the adapter supports for the HDR
/// target, down to 1.
fn supported_sample_count(adapter: &wgpu::Adapter, requested: u32) -> u32 {
    let flags = adapter
        .get_texture_format_features(RenderCommon::HDR_FORMAT)
        .flags;

    let supported = [16, 8, 4, 2]
        .into_iter()
        .filter(|&count| count <= requested && flags.sample_count_supported(count))
        .max()
        .unwrap_or(1);

    if supported != requested {
        log::warn!("{requested}x MSAA is not supported, using {supported}x");
    }

    supported
}
