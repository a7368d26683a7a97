use glam::Vec3;

#[derive(Debug, Clone)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Shines from `position` towards the origin.
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub name: &'static str,
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
}

impl DirectionalLight {
    /// Unit vector from the lit point towards the light.
    pub fn direction_to_light(&self) -> Vec3 {
        self.position.normalize_or(Vec3::Y)
    }
}

#[derive(Debug, Clone)]
pub struct LightRig {
    pub ambient: AmbientLight,
    pub directional: Vec<DirectionalLight>,
}

impl LightRig {
    pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            ambient: AmbientLight {
                color: Vec3::ONE,
                intensity: 0.4,
            },
            directional: vec![
                DirectionalLight {
                    name: "Main",
                    color: Vec3::ONE,
                    intensity: 1.2,
                    position: Vec3::new(5.0, 5.0, 5.0),
                },
                DirectionalLight {
                    name: "Fill",
                    color: Vec3::ONE,
                    intensity: 0.6,
                    position: Vec3::new(-3.0, 3.0, 2.0),
                },
                DirectionalLight {
                    name: "Rim",
                    color: Vec3::ONE,
                    intensity: 0.4,
                    position: Vec3::new(0.0, -2.0, 5.0),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rig_fits_in_the_uniform() {
        let rig = LightRig::default();
        assert_eq!(rig.directional.len(), 3);
        assert!(rig.directional.len() <= LightRig::MAX_DIRECTIONAL_LIGHTS);
    }

    #[test]
    fn rim_light_comes_from_below() {
        let rig = LightRig::default();
        let rim = rig.directional.iter().find(|l| l.name == "Rim").unwrap();

        let direction = rim.direction_to_light();
        assert!((direction.length() - 1.0).abs() < 1e-6);
        assert!(direction.y < 0.0);
    }
}
