//! Equirectangular HDR environment used for image-based reflections.
//!
//! Rougher surfaces sample lower-resolution mip levels, so the chain is built
//! once on load with a box filter instead of a proper GGX prefilter.

use std::path::Path;

use anyhow::{bail, Context};
use rayon::prelude::*;

pub type Texel = [f32; 4];

pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<Texel>,
}

pub struct EnvironmentMap {
    pub name: String,
    pub levels: Vec<MipLevel>,
}

impl EnvironmentMap {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to decode HDR image {}", path.display()))?
            .to_rgba32f();

        let (width, height) = image.dimensions();
        let texels = image
            .into_raw()
            .chunks_exact(4)
            .map(|texel| [texel[0], texel[1], texel[2], 1.0])
            .collect();

        let map = Self::from_texels(path.display().to_string(), width, height, texels)?;
        log::info!(
            "Loaded environment {} ({}x{}, {} mip levels)",
            map.name,
            width,
            height,
            map.levels.len()
        );

        Ok(map)
    }

    pub fn from_texels(
        name: impl Into<String>,
        width: u32,
        height: u32,
        texels: Vec<Texel>,
    ) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            bail!("Environment map has zero size ({width}x{height})");
        }

        if texels.len() != (width * height) as usize {
            bail!(
                "Environment map is {width}x{height} but has {} texels",
                texels.len()
            );
        }

        let mut levels = vec![MipLevel {
            width,
            height,
            texels,
        }];

        while let Some(next) = levels.last().and_then(downsample) {
            levels.push(next);
        }

        Ok(Self {
            name: name.into(),
            levels,
        })
    }

    pub fn mip_level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Drops the largest levels until the base level is at most
    /// `max_dimension` on both sides. Returns how many levels were dropped.
    pub fn fit_within(&mut self, max_dimension: u32) -> usize {
        let oversized = self
            .levels
            .iter()
            .take_while(|level| level.width.max(level.height) > max_dimension)
            .count()
            .min(self.levels.len() - 1);

        self.levels.drain(..oversized);
        oversized
    }

    pub fn width(&self) -> u32 {
        self.levels[0].width
    }

    pub fn height(&self) -> u32 {
        self.levels[0].height
    }
}

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    width.max(height).max(1).ilog2() + 1
}

/// Halves a level with a 2x2 box filter, clamping at odd edges. `None` once 1x1.
fn downsample(level: &MipLevel) -> Option<MipLevel> {
    if level.width == 1 && level.height == 1 {
        return None;
    }

    let width = (level.width / 2).max(1);
    let height = (level.height / 2).max(1);
    let mut texels = vec![[0.0; 4]; (width * height) as usize];

    let source = |x: u32, y: u32| {
        let x = x.min(level.width - 1);
        let y = y.min(level.height - 1);
        level.texels[(y * level.width + x) as usize]
    };

    texels
        .par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, texel) in row.iter_mut().enumerate() {
                let x = x as u32;
                let samples = [
                    source(2 * x, 2 * y),
                    source(2 * x + 1, 2 * y),
                    source(2 * x, 2 * y + 1),
                    source(2 * x + 1, 2 * y + 1),
                ];

                for channel in 0..4 {
                    texel[channel] = samples.iter().map(|s| s[channel]).sum::<f32>() * 0.25;
                }
            }
        });

    Some(MipLevel {
        width,
        height,
        texels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ends_at_one_by_one() {
        let map = EnvironmentMap::from_texels("test", 16, 8, vec![[1.0; 4]; 128]).unwrap();

        assert_eq!(map.mip_level_count(), mip_level_count(16, 8));
        assert_eq!(map.mip_level_count(), 5);
        let last = map.levels.last().unwrap();
        assert_eq!((last.width, last.height), (1, 1));
    }

    #[test]
    fn non_power_of_two_sizes_are_handled() {
        let map = EnvironmentMap::from_texels("test", 5, 3, vec![[0.5; 4]; 15]).unwrap();

        let sizes = map
            .levels
            .iter()
            .map(|level| (level.width, level.height))
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![(5, 3), (2, 1), (1, 1)]);
        assert_eq!(map.mip_level_count(), mip_level_count(5, 3));
    }

    #[test]
    fn constant_image_stays_constant() {
        let color = [2.0, 0.5, 8.0, 1.0];
        let map = EnvironmentMap::from_texels("test", 7, 4, vec![color; 28]).unwrap();

        for level in &map.levels {
            for texel in &level.texels {
                for channel in 0..4 {
                    assert!((texel[channel] - color[channel]).abs() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn downsampling_averages_energy() {
        let texels = vec![
            [4.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let map = EnvironmentMap::from_texels("test", 2, 2, texels).unwrap();

        assert_eq!(map.levels[1].texels, vec![[1.0, 0.0, 0.0, 1.0]]);
    }

    #[test]
    fn oversized_maps_lose_their_largest_levels() {
        let mut map = EnvironmentMap::from_texels("test", 16, 8, vec![[1.0; 4]; 128]).unwrap();

        assert_eq!(map.fit_within(16), 0);
        assert_eq!(map.fit_within(5), 2);
        assert_eq!((map.width(), map.height()), (4, 2));
        assert_eq!(map.mip_level_count(), 3);

        // The 1x1 level always survives
        assert_eq!(map.fit_within(0), 2);
        assert_eq!((map.width(), map.height()), (1, 1));
    }

    #[test]
    fn mismatched_texel_count_is_an_error() {
        assert!(EnvironmentMap::from_texels("test", 4, 4, vec![[0.0; 4]; 3]).is_err());
        assert!(EnvironmentMap::from_texels("test", 0, 4, Vec::new()).is_err());
    }
}
