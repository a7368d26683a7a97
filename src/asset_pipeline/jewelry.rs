//! Material tweaks that give a loaded product a polished-metal look.

use glam::Vec3;

use crate::asset_pipeline::materials::{
    srgb_hex_to_linear, Material, MaterialMaps, PbrMaterial,
};

pub const DEFAULT_GOLD_HEX: u32 = 0xD4AF37;

pub const MIN_METALNESS: f32 = 0.8;
pub const MAX_ROUGHNESS: f32 = 0.3;
pub const MIN_ENV_MAP_INTENSITY: f32 = 1.2;

pub fn default_gold() -> Vec3 {
    srgb_hex_to_linear(DEFAULT_GOLD_HEX)
}

/// Upgrades a material in place.
///
/// PBR materials are clamped towards metallic and glossy; anything else is
/// replaced by a physical material that keeps only the base colour. Applying
/// this twice gives the same result as applying it once.
pub fn enhance_material(material: &mut Material) {
    match material {
        Material::Standard(pbr) | Material::Physical(pbr) => clamp_pbr(pbr),
        Material::Basic(basic) => {
            let color = basic.color.unwrap_or_else(default_gold);
            let replacement = jewelry_material(std::mem::take(&mut basic.name), color);
            *material = Material::Physical(replacement);
        }
    }
}

fn clamp_pbr(pbr: &mut PbrMaterial) {
    pbr.metalness = pbr.metalness.max(MIN_METALNESS);
    pbr.roughness = pbr.roughness.min(MAX_ROUGHNESS);
    pbr.env_map_intensity = pbr.env_map_intensity.max(MIN_ENV_MAP_INTENSITY);
}

fn jewelry_material(name: String, color: Vec3) -> PbrMaterial {
    PbrMaterial {
        name,
        color,
        metalness: 0.9,
        roughness: 0.2,
        clearcoat: 0.3,
        clearcoat_roughness: 0.1,
        env_map_intensity: 1.5,
        maps: MaterialMaps::default(),
    }
}
