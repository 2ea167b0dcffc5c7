// SPDX-License-Identifier: CEPL-1.0
//! Simulation time and frame-rate bookkeeping for the shader's uniforms.

/// Weight of the newest sample in the displayed frame rate.
pub const FPS_SMOOTHING: f32 = 0.005;

#[derive(Clone, Debug)]
pub struct FrameClock {
    playing: bool,
    simulation_time: f64,
    delta: f32,
    /// Negative until the first sample arrives.
    fps: f32,
    frame: u32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            playing: true,
            simulation_time: 0.0,
            delta: 0.0,
            fps: -1.0,
            frame: 0,
        }
    }
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one frame's wall-clock delta. Time, delta and fps are frozen
    /// while stopped.
    pub fn tick(&mut self, dt: f32) {
        if !self.playing || !(dt > 0.0) || !dt.is_finite() {
            return;
        }
        self.delta = dt;
        self.simulation_time += f64::from(dt);

        let instant = 1.0 / dt;
        self.fps = if self.fps < 0.0 {
            instant
        } else {
            instant * FPS_SMOOTHING + (1.0 - FPS_SMOOTHING) * self.fps
        };
    }

    /// Counts a frame that made it to the presentation engine.
    pub fn count_presented(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    pub fn restart(&mut self) {
        self.simulation_time = 0.0;
    }

    pub fn toggle_playing(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn simulation_time(&self) -> f64 {
        self.simulation_time
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Smoothed frames per second, `0.0` before the first sample.
    pub fn fps(&self) -> f32 {
        self.fps.max(0.0)
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }
}
