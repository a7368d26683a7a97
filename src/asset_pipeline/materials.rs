use glam::Vec3;
use id_arena::Id;

pub type TextureId = Id<TextureData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    Linear,
}

/// Decoded texture, always RGBA8.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialMaps {
    pub base_color: Option<TextureId>,
    pub metallic_roughness: Option<TextureId>,
    pub normal: Option<TextureId>,
}

/// Unlit material. glTF unlit materials always carry a colour factor, but a
/// material built by hand may not.
#[derive(Debug, Clone)]
pub struct BasicMaterial {
    pub name: String,
    pub color: Option<Vec3>,
    pub color_map: Option<TextureId>,
}

#[derive(Debug, Clone)]
pub struct PbrMaterial {
    pub name: String,
    /// Linear RGB.
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub env_map_intensity: f32,
    pub maps: MaterialMaps,
}

impl PbrMaterial {
    /// glTF metallic-roughness defaults.
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: Vec3::ONE,
            metalness: 1.0,
            roughness: 1.0,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
            env_map_intensity: 1.0,
            maps: MaterialMaps::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Material {
    Basic(BasicMaterial),
    Standard(PbrMaterial),
    Physical(PbrMaterial),
}

impl Material {
    pub fn name(&self) -> &str {
        match self {
            Material::Basic(basic) => &basic.name,
            Material::Standard(pbr) | Material::Physical(pbr) => &pbr.name,
        }
    }

    pub fn pbr(&self) -> Option<&PbrMaterial> {
        match self {
            Material::Basic(_) => None,
            Material::Standard(pbr) | Material::Physical(pbr) => Some(pbr),
        }
    }
}

pub fn srgb_to_linear(channel: f32) -> f32 {
    if channel <= 0.04045 {
        channel / 12.92
    } else {
        ((channel + 0.055) / 1.055).powf(2.4)
    }
}

/// `0xRRGGBB` in sRGB to linear RGB.
pub fn srgb_hex_to_linear(hex: u32) -> Vec3 {
    let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
    Vec3::new(channel(16), channel(8), channel(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_conversion_hits_endpoints() {
        assert_eq!(srgb_hex_to_linear(0x000000), Vec3::ZERO);
        assert!(srgb_hex_to_linear(0xffffff).abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn hex_conversion_is_per_channel() {
        let color = srgb_hex_to_linear(0xff0080);

        assert!((color.x - 1.0).abs() < 1e-6);
        assert_eq!(color.y, 0.0);
        assert!((color.z - 0.2158605).abs() < 1e-5);
    }
}
