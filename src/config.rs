use std::{path::PathBuf, time::Duration};

use glam::Vec3;

use crate::lighting::LightRig;

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub window_title: String,
    pub model_path: PathBuf,
    pub environment_path: PathBuf,
    /// Longest side of the model after normalization, in world units.
    pub model_size: f32,
    /// Time for one full turn of the model.
    pub rotation_period: Duration,
    /// Duration of the eased camera move triggered by "Customize".
    pub focus_duration: Duration,
    pub camera: CameraConfig,
    pub controls: OrbitControlsConfig,
    pub lights: LightRig,
    pub render: RenderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "Lustre".to_string(),
            model_path: PathBuf::from("assets/models/ring.glb"),
            environment_path: PathBuf::from("assets/hdr/studio_small.hdr"),
            model_size: 1.5,
            rotation_period: Duration::from_secs(20),
            focus_duration: Duration::from_secs(1),
            camera: CameraConfig::default(),
            controls: OrbitControlsConfig::default(),
            lights: LightRig::default(),
            render: RenderConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub position: Vec3,
    pub target: Vec3,
    /// Degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            fov_y: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrbitControlsConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitControlsConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.06,
            min_distance: 1.5,
            max_distance: 4.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Linear RGB, opaque.
    pub clear_color: wgpu::Color,
    pub exposure: f32,
    pub msaa_samples: u32,
    /// Upper bound for the window scale factor used for the render resolution.
    pub max_pixel_ratio: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: wgpu::Color::WHITE,
            exposure: 1.3,
            msaa_samples: 4,
            max_pixel_ratio: 2.0,
        }
    }
}
