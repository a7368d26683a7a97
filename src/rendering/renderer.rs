use std::sync::Arc;

use anyhow::Context;
use id_arena::Arena;
use wgpu::CommandEncoderDescriptor;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera::CameraUniform,
    config::RenderConfig,
    engine::FrameTiming,
    rendering::{
        global_uniform::GlobalUniformState,
        imgui_renderer::ImguiRendererState,
        instance::gather_instances,
        passes::{
            pass::Pass,
            pbr_pass::{PbrPass, PbrTextureViews},
            tonemap_pass::{TonemapPass, TonemapTextureViews},
        },
        render_common::RenderCommon,
        render_environment::RenderEnvironment,
        render_material_manager::RenderMaterialManager,
        render_model::{render_model_instances, RenderModel},
        shader_loader::{PipelineCacheBuilder, ShaderLoader},
        texture::{DepthTexture, HdrTarget},
    },
    viewer::ViewerState,
};

/// A frame that has been drawn but not yet submitted, so the overlay can be
/// rendered on top.
pub struct FrameOutput {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

pub struct Renderer {
    pub window: Arc<Window>,
    /// Surface size.
    pub size: PhysicalSize<u32>,
    /// Size of the HDR scene target, see [`render_resolution`].
    render_size: PhysicalSize<u32>,
    config: RenderConfig,

    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,

    common: Arc<RenderCommon>,
    hdr_target: HdrTarget,
    depth_texture: DepthTexture,

    render_models: Arena<RenderModel>,
    materials: RenderMaterialManager,
    environment: RenderEnvironment,
    camera_uniform: CameraUniform,

    shader_loader: ShaderLoader,

    pbr_pass: PbrPass,
    tonemap_pass: TonemapPass,
    tonemap_input: wgpu::BindGroup,

    imgui_renderer: ImguiRendererState,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        state: &ViewerState,
        imgui_context: &mut imgui::Context,
    ) -> anyhow::Result<Renderer> {
        let size = window.inner_size();
        let config = state.config.render.clone();
        let render_size = render_resolution(size, window.scale_factor(), config.max_pixel_ratio);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(window.clone())
            .context("Failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter found")?;

        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                label: None,
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to create device")?;

        let mut camera_uniform = CameraUniform::default();
        camera_uniform.update(render_size, &state.camera);
        let camera_uniform_buffer = camera_uniform.create_buffer(&device);

        let common = Arc::new(RenderCommon::new(
            &device,
            &adapter,
            &surface,
            size,
            camera_uniform_buffer,
            &config,
            &state.lights,
        )?);

        let hdr_target = HdrTarget::new(&device, render_size, common.msaa_samples);
        let depth_texture =
            DepthTexture::new(&device, render_size, common.msaa_samples, "Depth Texture");

        let materials =
            RenderMaterialManager::new(&device, &queue, common.material_bind_group_layout.clone());
        let environment =
            RenderEnvironment::placeholder(&device, &queue, &common.environment_bind_group_layout);

        let mut cache_builder = PipelineCacheBuilder::new();

        let pbr_pass = PbrPass::create(&device, common.clone(), &mut cache_builder)?;
        let tonemap_pass = TonemapPass::create(&device, common.clone(), &mut cache_builder)?;
        let tonemap_input = tonemap_pass.create_input_bind_group(&device, hdr_target.resolved_view());

        let shader_loader = ShaderLoader::new(device.clone(), cache_builder)?;

        let imgui_renderer =
            ImguiRendererState::new(&device, &queue, common.surface_format(), imgui_context);

        log::info!(
            "Renderer ready: surface {}x{}, scene {}x{}, {}x MSAA",
            size.width,
            size.height,
            render_size.width,
            render_size.height,
            common.msaa_samples
        );

        Ok(Self {
            window,
            size,
            render_size,
            config,
            surface,
            device,
            queue,
            common,
            hdr_target,
            depth_texture,
            render_models: Arena::new(),
            materials,
            environment,
            camera_uniform,
            shader_loader,
            pbr_pass,
            tonemap_pass,
            tonemap_input,
            imgui_renderer,
        })
    }

    /// Uploads models, materials and the environment that appeared since the
    /// last frame.
    fn sync_scene(&mut self, state: &mut ViewerState) {
        for (_id, scene_model) in state.scene.models.iter_mut() {
            if scene_model.render_model.is_some() {
                continue;
            }

            let render_model = RenderModel::from_model(&self.device, &scene_model.model);
            scene_model.render_model = Some(self.render_models.alloc(render_model));
            log::info!(
                "Loaded model {} with {} primitives",
                scene_model.model.name,
                scene_model.model.primitives.len()
            );
        }

        self.materials.sync(&state.materials);

        if let Some(mut map) = state.take_environment() {
            let max_dimension = self.device.limits().max_texture_dimension_2d;
            let dropped = map.fit_within(max_dimension);
            if dropped > 0 {
                log::warn!(
                    "Environment {} exceeds the {}px texture limit, dropped {} mip levels",
                    map.name,
                    max_dimension,
                    dropped
                );
            }

            self.environment = RenderEnvironment::from_map(
                &self.device,
                &self.queue,
                &self.common.environment_bind_group_layout,
                &map,
            );
        }
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.size = new_size;
        {
            let mut config = self
                .common
                .output_surface_config
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            config.width = new_size.width;
            config.height = new_size.height;
            self.surface.configure(&self.device, &config);
        }

        self.render_size = render_resolution(
            new_size,
            self.window.scale_factor(),
            self.config.max_pixel_ratio,
        );
        self.hdr_target.resize(&self.device, self.render_size);
        self.depth_texture.resize(&self.device, self.render_size);
        self.tonemap_input = self
            .tonemap_pass
            .create_input_bind_group(&self.device, self.hdr_target.resolved_view());
    }

    pub fn render(
        &mut self,
        state: &mut ViewerState,
        timing: &FrameTiming,
    ) -> Result<FrameOutput, wgpu::SurfaceError> {
        self.shader_loader.load_pending_shaders();
        self.sync_scene(state);

        self.camera_uniform.update(self.render_size, &state.camera);
        self.camera_uniform
            .update_buffer(&self.queue, &self.common.camera_uniform_buffer);
        self.common.global_uniform.update(
            &self.queue,
            GlobalUniformState::new(
                self.hdr_target.size(),
                timing.elapsed.as_secs_f32(),
                &self.config,
                &state.lights,
                self.environment.mip_count,
            ),
        );

        gather_instances(&state.scene, &mut self.render_models);

        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let pipeline_cache = &self.shader_loader.cache;

        self.pbr_pass.render(
            &PbrTextureViews {
                color: self.hdr_target.render_view().clone(),
                resolve_target: self.hdr_target.resolve_target().cloned(),
                depth: self.depth_texture.view().clone(),
            },
            &mut encoder,
            pipeline_cache,
            |render_pass| {
                render_pass.set_bind_group(2, &self.environment.bind_group, &[]);

                for (_id, render_model) in self.render_models.iter() {
                    if !render_model.instances.should_render() {
                        continue;
                    }

                    render_model_instances(render_pass, &self.queue, &self.materials, render_model);
                }
            },
        );

        self.tonemap_pass.render(
            &TonemapTextureViews {
                output: view.clone(),
                input: self.tonemap_input.clone(),
            },
            &mut encoder,
            pipeline_cache,
            |_| {},
        );

        Ok(FrameOutput {
            surface_texture,
            view,
            encoder,
        })
    }

    /// Draws the overlay into `output`, submits and presents.
    pub fn finish_frame(
        &mut self,
        output: FrameOutput,
        imgui_context: &mut imgui::Context,
    ) -> anyhow::Result<()> {
        let FrameOutput {
            surface_texture,
            view,
            mut encoder,
        } = output;

        let overlay = self.imgui_renderer.render(
            &view,
            imgui_context,
            &self.device,
            &self.queue,
            &mut encoder,
        );

        self.queue.submit([encoder.finish()]);
        surface_texture.present();

        overlay
    }
}

/// The scene is rendered at the window's logical size times the scale factor,
/// with the scale factor capped at `max_pixel_ratio`.
pub fn render_resolution(
    window_size: PhysicalSize<u32>,
    scale_factor: f64,
    max_pixel_ratio: f64,
) -> PhysicalSize<u32> {
    let scale_factor = if scale_factor > 0.0 { scale_factor } else { 1.0 };
    let pixel_ratio = scale_factor.min(max_pixel_ratio);
    let scale = |physical: u32| {
        let logical = physical as f64 / scale_factor;
        ((logical * pixel_ratio).round() as u32).max(1)
    };

    PhysicalSize::new(scale(window_size.width), scale(window_size.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_resolution_follows_the_window_up_to_ratio_two() {
        let size = PhysicalSize::new(1600, 900);

        assert_eq!(render_resolution(size, 1.0, 2.0), size);
        assert_eq!(render_resolution(size, 2.0, 2.0), size);
    }

    #[test]
    fn render_resolution_is_capped_on_dense_displays() {
        let size = PhysicalSize::new(2000, 1000);

        assert_eq!(
            render_resolution(size, 3.0, 2.0),
            PhysicalSize::new(1333, 667)
        );
    }

    #[test]
    fn render_resolution_is_never_zero() {
        assert_eq!(
            render_resolution(PhysicalSize::new(1, 1), 4.0, 2.0),
            PhysicalSize::new(1, 1)
        );
    }
}
