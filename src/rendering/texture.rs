use winit::dpi::PhysicalSize;

use crate::rendering::render_common::RenderCommon;

fn create_render_target(
    device: &wgpu::Device,
    size: PhysicalSize<u32>,
    format: wgpu::TextureFormat,
    sample_count: u32,
    usage: wgpu::TextureUsages,
    label: &str,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.width.max(1),
            height: size.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    (texture, view)
}

pub struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sample_count: u32,
    label: String,
}

impl DepthTexture {
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(
        device: &wgpu::Device,
        size: PhysicalSize<u32>,
        sample_count: u32,
        label: impl Into<String>,
    ) -> Self {
        let label: String = label.into();
        let (texture, view) = create_render_target(
            device,
            size,
            Self::DEPTH_FORMAT,
            sample_count,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            &label,
        );

        DepthTexture {
            _texture: texture,
            view,
            sample_count,
            label,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        *self = Self::new(device, size, self.sample_count, self.label.clone());
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Linear HDR colour target. With MSAA the scene is drawn into a multisampled
/// texture and resolved into `resolved`, which is what later passes sample.
pub struct HdrTarget {
    _multisampled: Option<wgpu::Texture>,
    multisampled_view: Option<wgpu::TextureView>,
    _resolved: wgpu::Texture,
    resolved_view: wgpu::TextureView,
    sample_count: u32,
    size: PhysicalSize<u32>,
}

impl HdrTarget {
    pub fn new(device: &wgpu::Device, size: PhysicalSize<u32>, sample_count: u32) -> Self {
        let (resolved, resolved_view) = create_render_target(
            device,
            size,
            RenderCommon::HDR_FORMAT,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "HDR colour target",
        );

        let (multisampled, multisampled_view) = if sample_count > 1 {
            let (texture, view) = create_render_target(
                device,
                size,
                RenderCommon::HDR_FORMAT,
                sample_count,
                wgpu::TextureUsages::RENDER_ATTACHMENT,
                "HDR colour target (multisampled)",
            );
            (Some(texture), Some(view))
        } else {
            (None, None)
        };

        Self {
            _multisampled: multisampled,
            multisampled_view,
            _resolved: resolved,
            resolved_view,
            sample_count,
            size,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        *self = Self::new(device, size, self.sample_count);
    }

    /// The view to draw into.
    pub fn render_view(&self) -> &wgpu::TextureView {
        self.multisampled_view
            .as_ref()
            .unwrap_or(&self.resolved_view)
    }

    /// Where multisampled rendering resolves to, if anywhere.
    pub fn resolve_target(&self) -> Option<&wgpu::TextureView> {
        self.multisampled_view
            .as_ref()
            .map(|_| &self.resolved_view)
    }

    /// Single-sampled result, for sampling in later passes.
    pub fn resolved_view(&self) -> &wgpu::TextureView {
        &self.resolved_view
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }
}
