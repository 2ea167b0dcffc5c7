// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::clock::FrameClock;

/// Fragment-stage push constant block. Layout matches the `Uniforms` block
/// in `shaders/toy.frag` (std430, 64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub resolution: [f32; 3],
    pub time: f32,
    pub time_delta: f32,
    pub frame_rate: f32,
    pub frame: u32,
    _pad: f32,
    pub mouse: [f32; 4],
    pub date: [f32; 4],
}

impl PushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(width: u32, height: u32, clock: &FrameClock, mouse: Vec4) -> Self {
        Self {
            resolution: [width as f32, height as f32, 1.0],
            time: clock.simulation_time() as f32,
            time_delta: clock.delta(),
            frame_rate: clock.fps(),
            frame: clock.frame(),
            _pad: 0.0,
            mouse: mouse.to_array(),
            date: [0.0; 4],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_64_bytes_with_vec4_aligned_mouse() {
        assert_eq!(PushConstants::SIZE, 64);
        assert_eq!(std::mem::offset_of!(PushConstants, mouse), 32);
        assert_eq!(std::mem::offset_of!(PushConstants, date), 48);
    }

    #[test]
    fn built_from_clock_and_mouse() {
        let mut clock = FrameClock::new();
        clock.tick(0.25);
        clock.count_presented();
        let pc = PushConstants::new(640, 480, &clock, Vec4::new(1.0, 2.0, -3.0, -4.0));
        assert_eq!(pc.resolution, [640.0, 480.0, 1.0]);
        assert_eq!(pc.time, 0.25);
        assert_eq!(pc.time_delta, 0.25);
        assert_eq!(pc.frame_rate, 4.0);
        assert_eq!(pc.frame, 1);
        assert_eq!(pc.mouse, [1.0, 2.0, -3.0, -4.0]);
        assert_eq!(pc.date, [0.0; 4]);
        assert_eq!(pc.as_bytes().len(), 64);
    }
}
