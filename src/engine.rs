use std::time::{Duration, Instant};

use crate::viewer::ViewerState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub index: u64,
    /// Time since the previous frame, zero for the first one.
    pub delta: Duration,
    /// Time since the loop was created.
    pub elapsed: Duration,
}

/// Something that is advanced and drawn once per frame.
pub trait FrameTarget {
    type Output;
    type Error;

    fn update(&mut self, timing: &FrameTiming);
    fn render(&mut self, timing: &FrameTiming) -> Result<Self::Output, Self::Error>;
}

pub struct FrameLoop {
    start: Instant,
    last_frame: Option<Instant>,
    frame_index: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            last_frame: None,
            frame_index: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    pub fn tick<T: FrameTarget>(&mut self, target: &mut T) -> Result<T::Output, T::Error> {
        self.tick_at(Instant::now(), target)
    }

    /// Runs one frame: a single update followed by a single render.
    pub fn tick_at<T: FrameTarget>(
        &mut self,
        now: Instant,
        target: &mut T,
    ) -> Result<T::Output, T::Error> {
        let delta = self
            .last_frame
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();

        let timing = FrameTiming {
            index: self.frame_index,
            delta,
            elapsed: now.saturating_duration_since(self.start),
        };

        self.last_frame = Some(now);
        self.frame_index += 1;

        target.update(&timing);
        target.render(&timing)
    }
}

pub fn update(state: &mut ViewerState, timing: &FrameTiming) {
    state.poll_assets();
    state.tweens.update(timing.delta, &mut state.scene);
    state.controls.update(&mut state.camera, timing.delta);
    state.scene.late_update();
}
