use std::time::Duration;

use glam::Quat;
use id_arena::{Arena, Id};

use crate::scene_graph::{object3d::ObjectId, scene::Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ease {
    Linear,
    Power2InOut,
}

impl Ease {
    pub fn apply(self, t: f32) -> f32 {
        match self {
            Ease::Linear => t,
            // Quadratic ease in/out
            Ease::Power2InOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    /// Play `n` extra cycles after the first one.
    Times(u32),
    Forever,
}

/// Interpolates a scalar from `from` to `to`. Each repeated cycle restarts at
/// `from`.
#[derive(Debug, Clone)]
pub struct Tween {
    from: f32,
    to: f32,
    duration: Duration,
    repeat: Repeat,
    ease: Ease,
    elapsed: Duration,
}

impl Tween {
    pub fn new(from: f32, to: f32, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            repeat: Repeat::Times(0),
            ease: Ease::Linear,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }

    pub fn delta(&self) -> f32 {
        self.to - self.from
    }

    pub fn repeat(&self) -> Repeat {
        self.repeat
    }

    pub fn advance(&mut self, delta_time: Duration) -> f32 {
        self.elapsed += delta_time;
        self.value()
    }

    pub fn is_finished(&self) -> bool {
        match self.repeat {
            Repeat::Forever => false,
            Repeat::Times(n) => self.elapsed >= self.duration * (n + 1),
        }
    }

    /// Eased progress within the current cycle, in `0.0..=1.0`.
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() || self.is_finished() {
            return 1.0;
        }

        let cycles = self.elapsed.as_secs_f64() / self.duration.as_secs_f64();
        self.ease.apply(cycles.fract() as f32)
    }

    pub fn value(&self) -> f32 {
        self.from + self.delta() * self.progress()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenTarget {
    /// Euler angle around the object's Y axis, in radians.
    ObjectRotationY(ObjectId),
}

pub struct ActiveTween {
    pub target: TweenTarget,
    pub tween: Tween,
}

pub type TweenId = Id<ActiveTween>;

/// Drives tweens that write into scene objects.
pub struct TweenManager {
    tweens: Arena<ActiveTween>,
    finished: Vec<TweenId>,
}

impl TweenManager {
    pub fn new() -> Self {
        Self {
            tweens: Arena::new(),
            finished: Vec::new(),
        }
    }

    pub fn add(&mut self, target: TweenTarget, tween: Tween) -> TweenId {
        self.tweens.alloc(ActiveTween { target, tween })
    }

    pub fn get(&self, id: TweenId) -> Option<&ActiveTween> {
        self.tweens.get(id)
    }

    pub fn is_active(&self, id: TweenId) -> bool {
        !self.finished.contains(&id)
    }

    pub fn update(&mut self, delta_time: Duration, scene: &mut Scene) {
        for (id, active) in self.tweens.iter_mut() {
            if self.finished.contains(&id) {
                continue;
            }

            let value = active.tween.advance(delta_time);

            match active.target {
                TweenTarget::ObjectRotationY(object_id) => {
                    scene.set_object_rotation(object_id, Quat::from_rotation_y(value));
                }
            }

            if active.tween.is_finished() {
                self.finished.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{PI, TAU};

    use super::*;
    use crate::scene_graph::object3d::Object3D;

    fn turntable() -> Tween {
        Tween::new(0.0, TAU, Duration::from_secs(20)).with_repeat(Repeat::Forever)
    }

    #[test]
    fn one_full_turn_per_cycle() {
        let tween = turntable();
        assert_eq!(tween.delta(), TAU);
        assert_eq!(tween.repeat(), Repeat::Forever);
    }

    #[test]
    fn linear_progress_is_proportional_to_time() {
        let mut tween = turntable();

        assert!((tween.advance(Duration::from_secs(5)) - PI / 2.0).abs() < 1e-5);
        assert!((tween.advance(Duration::from_secs(5)) - PI).abs() < 1e-5);
    }

    #[test]
    fn infinite_tween_restarts_and_never_finishes() {
        let mut tween = turntable();

        tween.advance(Duration::from_secs(20 * 1000));
        assert!(!tween.is_finished());
        assert!(tween.value().abs() < 1e-4);

        let value = tween.advance(Duration::from_millis(2500));
        assert!((value - PI / 4.0).abs() < 1e-4);
        assert!(!tween.is_finished());
    }

    #[test]
    fn finite_tween_settles_on_target() {
        let mut tween = Tween::new(1.0, 3.0, Duration::from_secs(1)).with_ease(Ease::Power2InOut);

        assert!(tween.advance(Duration::from_millis(250)) < 1.5);
        assert_eq!(tween.advance(Duration::from_secs(2)), 3.0);
        assert!(tween.is_finished());
    }

    #[test]
    fn power2_in_out_is_symmetric() {
        let ease = Ease::Power2InOut;

        assert_eq!(ease.apply(0.0), 0.0);
        assert_eq!(ease.apply(0.5), 0.5);
        assert_eq!(ease.apply(1.0), 1.0);
        assert!((ease.apply(0.25) + ease.apply(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn manager_rotates_target_object() {
        let mut scene = Scene::new();
        let object = scene.add_object(Object3D::named("Ring"));
        let mut tweens = TweenManager::new();
        let id = tweens.add(TweenTarget::ObjectRotationY(object), turntable());

        tweens.update(Duration::from_secs(5), &mut scene);

        let rotation = scene.get_object_transform(object).unwrap().rotation();
        assert!(rotation.abs_diff_eq(Quat::from_rotation_y(PI / 2.0), 1e-5));
        assert!(tweens.is_active(id));
    }

    #[test]
    fn manager_retires_finished_tweens() {
        let mut scene = Scene::new();
        let object = scene.add_object(Object3D::named("Ring"));
        let mut tweens = TweenManager::new();
        let id = tweens.add(
            TweenTarget::ObjectRotationY(object),
            Tween::new(0.0, 1.0, Duration::from_secs(1)),
        );

        tweens.update(Duration::from_secs(2), &mut scene);
        assert!(!tweens.is_active(id));

        scene.set_object_rotation(object, Quat::IDENTITY);
        tweens.update(Duration::from_secs(1), &mut scene);
        let rotation = scene.get_object_transform(object).unwrap().rotation();
        assert_eq!(rotation, Quat::IDENTITY);
    }
}
