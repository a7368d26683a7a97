use std::f32::consts::TAU;

use anyhow::Context;
use glam::EulerRot;

use crate::{
    camera::Camera,
    config::ViewerConfig,
    environment::EnvironmentMap,
    lighting::LightRig,
    loader::{self, GltfAsset, PendingAsset},
    material_manager::MaterialManager,
    orbit_controls::OrbitControls,
    scene_graph::{object3d::ObjectId, scene::Normalization, scene::Scene},
    tween::{Repeat, Tween, TweenId, TweenManager, TweenTarget},
};

#[derive(Debug, Clone, PartialEq)]
pub enum AssetStatus {
    Loading,
    Ready,
    Failed(String),
}

/// The product currently on display.
pub struct LoadedModel {
    pub root: ObjectId,
    pub normalization: Option<Normalization>,
    pub rotation: TweenId,
}

pub struct ViewerState {
    pub config: ViewerConfig,
    pub camera: Camera,
    pub controls: OrbitControls,
    pub lights: LightRig,
    pub scene: Scene,
    pub materials: MaterialManager,
    pub tweens: TweenManager,

    pub model: Option<LoadedModel>,
    pub model_status: AssetStatus,
    pub environment_status: AssetStatus,

    pending_model: Option<PendingAsset<GltfAsset>>,
    pending_environment: Option<PendingAsset<EnvironmentMap>>,
    // Waiting to be picked up by the renderer
    environment: Option<EnvironmentMap>,
}

impl ViewerState {
    /// Builds the scene and starts loading the model and the environment in
    /// the background.
    pub fn new(config: ViewerConfig) -> anyhow::Result<Self> {
        let mut state = Self::without_assets(config);

        state.pending_environment = Some(
            loader::load_environment(state.config.environment_path.clone())
                .context("Failed to start loading the environment map")?,
        );
        state.pending_model = Some(
            loader::load_model(state.config.model_path.clone())
                .context("Failed to start loading the model")?,
        );

        Ok(state)
    }

    fn without_assets(config: ViewerConfig) -> Self {
        let camera = Camera::from_config(&config.camera);
        let controls = OrbitControls::new(config.controls.clone(), &camera);
        let lights = config.lights.clone();

        Self {
            config,
            camera,
            controls,
            lights,
            scene: Scene::new(),
            materials: MaterialManager::new(),
            tweens: TweenManager::new(),
            model: None,
            model_status: AssetStatus::Loading,
            environment_status: AssetStatus::Loading,
            pending_model: None,
            pending_environment: None,
            environment: None,
        }
    }

    /// Picks up finished background loads. A failed load is logged and the
    /// viewer carries on without that asset.
    pub fn poll_assets(&mut self) {
        if let Some(result) = self.pending_environment.as_mut().and_then(PendingAsset::poll) {
            self.pending_environment = None;

            match result {
                Ok(environment) => {
                    self.environment = Some(environment);
                    self.environment_status = AssetStatus::Ready;
                }
                Err(e) => {
                    log::error!("{e:#}");
                    self.environment_status = AssetStatus::Failed(format!("{e:#}"));
                }
            }
        }

        if let Some(result) = self.pending_model.as_mut().and_then(PendingAsset::poll) {
            self.pending_model = None;

            match result.and_then(|asset| self.attach_model(&asset)) {
                Ok(_) => self.model_status = AssetStatus::Ready,
                Err(e) => {
                    log::error!("{e:#}");
                    self.model_status = AssetStatus::Failed(format!("{e:#}"));
                }
            }
        }
    }

    /// Spawns the asset's scene, fits it into the view, upgrades its materials
    /// and sets it spinning.
    pub fn attach_model(&mut self, asset: &GltfAsset) -> anyhow::Result<ObjectId> {
        let gltf_scene = asset
            .document
            .default_scene()
            .or_else(|| asset.document.scenes().next())
            .context("No scenes in gltf")?;

        let root = self
            .scene
            .spawn_gltf_scene(&mut self.materials, asset, &gltf_scene)?;

        if let Some(last_mesh) = self.scene.mesh_objects(root).last() {
            if let Some(object) = self.scene.get_object(*last_mesh) {
                log::info!("Found mesh: {}", object.name);
            }
        }

        let normalization = self.scene.normalize_object(root, self.config.model_size);
        match normalization {
            Some(n) => log::info!(
                "Normalized {}: scale {}, translation {}",
                asset.file_name,
                n.scale,
                n.translation
            ),
            None => log::warn!("{} has no mesh geometry to normalize", asset.file_name),
        }

        let material_ids = self.scene.material_ids(root);
        self.materials.enhance_for_jewelry(material_ids);

        let start_angle = self
            .scene
            .get_object(root)
            .map(|object| object.transform.rotation().to_euler(EulerRot::YXZ).0)
            .unwrap_or(0.0);

        let rotation = self.tweens.add(
            TweenTarget::ObjectRotationY(root),
            Tween::new(start_angle, start_angle + TAU, self.config.rotation_period)
                .with_repeat(Repeat::Forever),
        );

        self.model = Some(LoadedModel {
            root,
            normalization,
            rotation,
        });

        Ok(root)
    }

    /// Hands a freshly loaded environment map over to the renderer.
    pub fn take_environment(&mut self) -> Option<EnvironmentMap> {
        self.environment.take()
    }

    /// Eases the camera back to its home framing of the product.
    pub fn focus_viewer(&mut self) {
        self.controls
            .return_home(&self.camera, self.config.focus_duration);
    }
}
