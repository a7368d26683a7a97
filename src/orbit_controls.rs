//! Orbit camera controller: drag to rotate around a target, wheel or pinch to
//! zoom, right drag or two fingers to pan. Input only accumulates deltas,
//! `update` applies them to the camera once per frame.

use std::{collections::HashMap, f32::consts::TAU, time::Duration};

use glam::{Vec2, Vec3};

use crate::{
    camera::Camera,
    config::OrbitControlsConfig,
    tween::{Ease, Tween},
};

const EPS: f32 = 1e-6;

/// Polar coordinates around +Y. `phi` is measured from +Y, `theta` around Y
/// starting at +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    pub phi: f32,
    pub theta: f32,
}

impl Spherical {
    pub fn from_vector(v: Vec3) -> Self {
        let radius = v.length();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }

        Self {
            radius,
            theta: v.x.atan2(v.z),
            // atan2 keeps precision close to the poles, where acos(y / r) rounds to 0
            phi: v.x.hypot(v.z).atan2(v.y),
        }
    }

    pub fn to_vector(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }

    /// Keeps `phi` away from the poles, where the view direction flips.
    pub fn make_safe(mut self) -> Self {
        self.phi = self.phi.clamp(EPS, std::f32::consts::PI - EPS);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DragMode {
    Rotate,
    Pan,
}

struct CameraMove {
    from_eye: Vec3,
    from_target: Vec3,
    to_eye: Vec3,
    to_target: Vec3,
    tween: Tween,
}

pub struct OrbitControls {
    pub config: OrbitControlsConfig,
    pub target: Vec3,
    home_eye: Vec3,
    home_target: Vec3,
    viewport_height: f32,

    spherical_delta: Spherical,
    pan_offset: Vec3,
    scale: f32,

    drag: Option<(DragMode, Vec2)>,
    pointer_position: Vec2,
    touches: HashMap<u64, Vec2>,
    camera_move: Option<CameraMove>,
}

impl OrbitControls {
    pub fn new(config: OrbitControlsConfig, camera: &Camera) -> Self {
        Self {
            config,
            target: camera.target,
            home_eye: camera.eye,
            home_target: camera.target,
            viewport_height: 1.0,
            spherical_delta: Spherical {
                radius: 0.0,
                phi: 0.0,
                theta: 0.0,
            },
            pan_offset: Vec3::ZERO,
            scale: 1.0,
            drag: None,
            pointer_position: Vec2::ZERO,
            touches: HashMap::new(),
            camera_move: None,
        }
    }

    pub fn set_viewport_height(&mut self, height: f32) {
        self.viewport_height = height.max(1.0);
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.phi -= angle;
    }

    /// `factor > 1` moves the camera closer.
    pub fn dolly_in(&mut self, factor: f32) {
        self.scale /= factor;
    }

    pub fn dolly_out(&mut self, factor: f32) {
        self.scale *= factor;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.config.zoom_speed)
    }

    fn rotate_by_pixels(&mut self, delta: Vec2) {
        let delta = delta * self.config.rotate_speed;
        self.rotate_left(TAU * delta.x / self.viewport_height);
        self.rotate_up(TAU * delta.y / self.viewport_height);
    }

    fn pan_by_pixels(&mut self, delta: Vec2, camera: &Camera) {
        let distance = (camera.eye - self.target).length();
        let half_height = distance * (camera.fov_y.to_radians() / 2.0).tan();
        let world_per_pixel = 2.0 * half_height / self.viewport_height * self.config.pan_speed;

        let (right, up) = camera.screen_axes();
        self.pan_offset += (-right * delta.x + up * delta.y) * world_per_pixel;
    }

    pub fn pointer_down(&mut self, button: PointerButton) {
        let mode = match button {
            PointerButton::Primary => DragMode::Rotate,
            PointerButton::Secondary | PointerButton::Middle => DragMode::Pan,
        };
        self.drag = Some((mode, self.pointer_position));
    }

    pub fn pointer_up(&mut self, _button: PointerButton) {
        self.drag = None;
    }

    pub fn pointer_moved(&mut self, position: Vec2, camera: &Camera) {
        self.pointer_position = position;

        let Some((mode, last)) = self.drag else {
            return;
        };
        let delta = position - last;
        self.drag = Some((mode, position));

        match mode {
            DragMode::Rotate => self.rotate_by_pixels(delta),
            DragMode::Pan => self.pan_by_pixels(delta, camera),
        }
    }

    /// Positive `lines` scroll away from the user and zoom in.
    pub fn wheel(&mut self, lines: f32) {
        if lines > 0.0 {
            self.dolly_in(self.zoom_scale().recip().powf(lines));
        } else if lines < 0.0 {
            self.dolly_out(self.zoom_scale().recip().powf(-lines));
        }
    }

    pub fn touch_start(&mut self, id: u64, position: Vec2) {
        self.touches.insert(id, position);
    }

    pub fn touch_end(&mut self, id: u64) {
        self.touches.remove(&id);
    }

    pub fn touch_moved(&mut self, id: u64, position: Vec2, camera: &Camera) {
        let Some(previous) = self.touches.get(&id).copied() else {
            return;
        };

        match self.touches.len() {
            1 => {
                self.touches.insert(id, position);
                self.rotate_by_pixels(position - previous);
            }
            2 => {
                let Some(other) = self
                    .touches
                    .iter()
                    .find(|(other_id, _)| **other_id != id)
                    .map(|(_, p)| *p)
                else {
                    return;
                };
                self.touches.insert(id, position);

                let old_distance = previous.distance(other);
                let new_distance = position.distance(other);
                if old_distance > 0.0 && new_distance > 0.0 {
                    self.dolly_in(new_distance / old_distance);
                }

                let old_center = (previous + other) * 0.5;
                let new_center = (position + other) * 0.5;
                self.pan_by_pixels(new_center - old_center, camera);
            }
            _ => {
                self.touches.insert(id, position);
            }
        }
    }

    /// Eases the camera back to where it started.
    pub fn return_home(&mut self, camera: &Camera, duration: Duration) {
        self.spherical_delta = Spherical {
            radius: 0.0,
            phi: 0.0,
            theta: 0.0,
        };
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;

        self.camera_move = Some(CameraMove {
            from_eye: camera.eye,
            from_target: self.target,
            to_eye: self.home_eye,
            to_target: self.home_target,
            tween: Tween::new(0.0, 1.0, duration).with_ease(Ease::Power2InOut),
        });
    }

    pub fn is_moving_home(&self) -> bool {
        self.camera_move.is_some()
    }

    /// Applies accumulated input to the camera. Returns true if the camera moved.
    pub fn update(&mut self, camera: &mut Camera, delta_time: Duration) -> bool {
        if let Some(camera_move) = &mut self.camera_move {
            let t = camera_move.tween.advance(delta_time);
            self.target = camera_move.from_target.lerp(camera_move.to_target, t);
            camera.eye = camera_move.from_eye.lerp(camera_move.to_eye, t);
            camera.target = self.target;

            if camera_move.tween.is_finished() {
                self.camera_move = None;
            } else {
                // Input is ignored until the move is done
                return true;
            }
        }

        let old_eye = camera.eye;
        let old_target = self.target;

        let mut spherical = Spherical::from_vector(camera.eye - self.target);

        if self.config.enable_damping {
            spherical.theta += self.spherical_delta.theta * self.config.damping_factor;
            spherical.phi += self.spherical_delta.phi * self.config.damping_factor;
            self.target += self.pan_offset * self.config.damping_factor;
        } else {
            spherical.theta += self.spherical_delta.theta;
            spherical.phi += self.spherical_delta.phi;
            self.target += self.pan_offset;
        }

        spherical = spherical.make_safe();
        spherical.radius = (spherical.radius * self.scale)
            .clamp(self.config.min_distance, self.config.max_distance);

        camera.eye = self.target + spherical.to_vector();
        camera.target = self.target;

        if self.config.enable_damping {
            let decay = 1.0 - self.config.damping_factor;
            self.spherical_delta.theta *= decay;
            self.spherical_delta.phi *= decay;
            self.pan_offset *= decay;
        } else {
            self.spherical_delta.theta = 0.0;
            self.spherical_delta.phi = 0.0;
            self.pan_offset = Vec3::ZERO;
        }

        self.scale = 1.0;

        old_eye.distance_squared(camera.eye) > EPS || old_target.distance_squared(self.target) > EPS
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::config::CameraConfig;

    fn setup() -> (OrbitControls, Camera) {
        let camera = Camera::from_config(&CameraConfig::default());
        let mut controls = OrbitControls::new(OrbitControlsConfig::default(), &camera);
        controls.set_viewport_height(800.0);
        (controls, camera)
    }

    fn distance(controls: &OrbitControls, camera: &Camera) -> f32 {
        (camera.eye - controls.target).length()
    }

    #[test]
    fn spherical_round_trips_a_vector() {
        let v = Vec3::new(1.0, 2.0, -3.0);
        assert!(Spherical::from_vector(v).to_vector().abs_diff_eq(v, 1e-5));
    }

    #[test]
    fn damping_applies_a_fraction_and_decays_the_rest() {
        let (mut controls, mut camera) = setup();
        controls.rotate_left(0.5);

        controls.update(&mut camera, Duration::ZERO);

        let theta = Spherical::from_vector(camera.eye - controls.target).theta;
        assert!((theta - (-0.5 * 0.06)).abs() < 1e-5);
        assert!((controls.spherical_delta.theta - (-0.5 * 0.94)).abs() < 1e-6);
    }

    #[test]
    fn motion_comes_to_rest_without_input() {
        let (mut controls, mut camera) = setup();
        controls.rotate_left(1.0);

        let mut frames = 0;
        while controls.update(&mut camera, Duration::from_millis(16)) {
            frames += 1;
            assert!(frames < 1000, "camera never settled");
        }

        let theta = Spherical::from_vector(camera.eye - controls.target).theta;
        // The geometric series sums to the full requested rotation
        assert!((theta + 1.0).abs() < 0.01);
    }

    #[test]
    fn zoom_is_clamped_to_distance_limits() {
        let (mut controls, mut camera) = setup();

        for _ in 0..100 {
            controls.wheel(5.0);
            controls.update(&mut camera, Duration::ZERO);
        }
        assert!((distance(&controls, &camera) - 1.5).abs() < 1e-5);

        for _ in 0..100 {
            controls.wheel(-5.0);
            controls.update(&mut camera, Duration::ZERO);
        }
        assert!((distance(&controls, &camera) - 4.0).abs() < 1e-5);
    }

    #[test]
    fn starting_distance_is_within_limits() {
        let (mut controls, mut camera) = setup();
        controls.update(&mut camera, Duration::ZERO);
        assert!((distance(&controls, &camera) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn polar_angle_never_reaches_the_poles() {
        let (mut controls, mut camera) = setup();

        for _ in 0..200 {
            controls.rotate_up(10.0);
            controls.update(&mut camera, Duration::ZERO);
            let phi = Spherical::from_vector(camera.eye - controls.target).phi;
            assert!(phi > 0.0 && phi < PI);
        }
    }

    #[test]
    fn dragging_right_orbits_left() {
        let (mut controls, mut camera) = setup();

        controls.pointer_moved(Vec2::new(100.0, 100.0), &camera);
        controls.pointer_down(PointerButton::Primary);
        controls.pointer_moved(Vec2::new(140.0, 100.0), &camera);
        controls.pointer_up(PointerButton::Primary);
        controls.update(&mut camera, Duration::ZERO);

        assert!(camera.eye.x < 0.0);
        assert!(camera.eye.y.abs() < 1e-5);
    }

    #[test]
    fn pinching_out_zooms_in() {
        let (mut controls, mut camera) = setup();

        controls.touch_start(1, Vec2::new(100.0, 100.0));
        controls.touch_start(2, Vec2::new(200.0, 100.0));
        controls.touch_moved(2, Vec2::new(300.0, 100.0), &camera);
        controls.update(&mut camera, Duration::ZERO);

        assert!(distance(&controls, &camera) < 2.0);
    }

    #[test]
    fn return_home_restores_the_initial_view() {
        let (mut controls, mut camera) = setup();
        let home = camera.eye;

        controls.rotate_left(2.0);
        controls.wheel(3.0);
        for _ in 0..30 {
            controls.update(&mut camera, Duration::from_millis(16));
        }
        assert!(!camera.eye.abs_diff_eq(home, 1e-3));

        controls.return_home(&camera, Duration::from_secs(1));
        assert!(controls.is_moving_home());
        for _ in 0..100 {
            controls.update(&mut camera, Duration::from_millis(16));
        }

        assert!(!controls.is_moving_home());
        assert!(camera.eye.abs_diff_eq(home, 1e-4));
        assert!(controls.target.abs_diff_eq(Vec3::ZERO, 1e-6));
    }
}
