use anyhow::Result;

mod asset_pipeline;
mod camera;
mod config;
mod engine;
mod environment;
mod lighting;
mod loader;
mod material_manager;
mod math;
mod model;
mod orbit_controls;
mod overlay;
mod rendering;
mod scene_graph;
mod tween;
mod viewer;
mod window;

fn main() -> Result<()> {
    pretty_env_logger::init();

    pollster::block_on(window::run())?;

    Ok(())
}
