use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::{config::RenderConfig, lighting::LightRig};

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct DirectionalLightUniform {
    /// xyz: unit vector towards the light, w: intensity.
    pub direction: Vec4,
    pub color: Vec4,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GlobalUniformState {
    /// rgb premultiplied by intensity.
    pub ambient: Vec4,
    pub lights: [DirectionalLightUniform; LightRig::MAX_DIRECTIONAL_LIGHTS],
    pub clear_color: Vec4,
    pub resolution: [f32; 2],
    pub now: f32,
    pub exposure: f32,
    pub light_count: u32,
    /// Zero until an environment map has been uploaded.
    pub environment_mip_count: f32,
    _padding: [f32; 2],
}

impl GlobalUniformState {
    pub fn new(
        resolution: PhysicalSize<u32>,
        now: f32,
        config: &RenderConfig,
        lights: &LightRig,
        environment_mip_count: u32,
    ) -> Self {
        if lights.directional.len() > LightRig::MAX_DIRECTIONAL_LIGHTS {
            log::warn!(
                "Only {} of {} directional lights are used",
                LightRig::MAX_DIRECTIONAL_LIGHTS,
                lights.directional.len()
            );
        }

        let mut light_uniforms = [DirectionalLightUniform::default(); LightRig::MAX_DIRECTIONAL_LIGHTS];
        for (uniform, light) in light_uniforms.iter_mut().zip(&lights.directional) {
            *uniform = DirectionalLightUniform {
                direction: light.direction_to_light().extend(light.intensity),
                color: light.color.extend(1.0),
            };
        }

        let clear = config.clear_color;

        Self {
            ambient: (lights.ambient.color * lights.ambient.intensity).extend(1.0),
            lights: light_uniforms,
            clear_color: Vec4::new(clear.r as f32, clear.g as f32, clear.b as f32, 1.0),
            resolution: [resolution.width as f32, resolution.height as f32],
            now,
            exposure: config.exposure,
            light_count: lights
                .directional
                .len()
                .min(LightRig::MAX_DIRECTIONAL_LIGHTS) as u32,
            environment_mip_count: environment_mip_count as f32,
            _padding: [0.0; 2],
        }
    }
}

pub struct GlobalUniform {
    buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl GlobalUniform {
    pub fn new(device: &wgpu::Device, initial_state: GlobalUniformState) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Global uniform buffer"),
            contents: bytemuck::cast_slice(&[initial_state]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Global uniform bind group layout"),
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

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Global uniform bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, state: GlobalUniformState) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[state]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_the_shader_struct() {
        assert_eq!(std::mem::size_of::<DirectionalLightUniform>(), 32);
        assert_eq!(std::mem::size_of::<GlobalUniformState>(), 192);
        assert_eq!(std::mem::offset_of!(GlobalUniformState, clear_color), 144);
        assert_eq!(std::mem::offset_of!(GlobalUniformState, light_count), 176);
    }

    #[test]
    fn lights_are_packed_in_order() {
        let state = GlobalUniformState::new(
            PhysicalSize::new(800, 600),
            0.0,
            &RenderConfig::default(),
            &LightRig::default(),
            0,
        );

        assert_eq!(state.light_count, 3);
        assert!((state.lights[0].direction.w - 1.2).abs() < 1e-6);
        assert!((state.lights[1].direction.w - 0.6).abs() < 1e-6);
        assert!((state.lights[2].direction.w - 0.4).abs() < 1e-6);
        assert_eq!(state.lights[3].direction, Vec4::ZERO);
        assert!((state.ambient.x - 0.4).abs() < 1e-6);
        assert_eq!(state.exposure, 1.3);
        assert_eq!(state.clear_color, Vec4::ONE);
    }
}
