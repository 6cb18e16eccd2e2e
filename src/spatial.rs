//! Per-channel spatialization.
//!
//! Pure functions turning a mono sample plus call and listener placement into a
//! per-channel amplitude: a directional left/right balance from the dot product
//! of the source direction against the listener's left axis, scaled by
//! inverse-distance attenuation. No HRTF and no air absorption; the whole model
//! is one dot product and one division per call and channel.

use crate::math::{Pose, Quat, Vec3};
use std::f32::consts::FRAC_PI_2;

/// Lane of the interleaved stereo output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    pub const STEREO: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Offset of this channel inside one interleaved frame.
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

/// Listener state frozen at dispatch time, so one render works against a
/// single consistent view however long it runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerSnapshot {
    pub position: Vec3,
    pub forward: Vec3,
    pub velocity: Vec3,
}

impl ListenerSnapshot {
    pub fn new(position: Vec3, forward: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            forward,
            velocity,
        }
    }

    pub fn from_pose(pose: &Pose, velocity: Vec3) -> Self {
        Self {
            position: pose.position,
            forward: pose.forward(),
            velocity,
        }
    }
}

impl Default for ListenerSnapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            velocity: Vec3::ZERO,
        }
    }
}

/// Smallest distance the attenuation divides by. A call sitting exactly on the
/// listener attenuates by `1 / DISTANCE_FLOOR` instead of dividing by zero.
pub const DISTANCE_FLOOR: f32 = 1e-3;

/// Directional balance of `channel` for a call at `call_position`, in `[0, 1]`.
///
/// The listener's left axis is its forward axis rotated 90° around vertical;
/// the balance is the dot of that axis (negated for the right channel) with
/// the unit direction towards the call, rescaled from `[-1, 1]` to `[0, 1]`.
/// A call directly left reaches 1.0 on the left channel and 0.0 on the right;
/// a call dead ahead (or co-located with the listener) sits at 0.5 on both.
pub fn channel_balance(
    call_position: Vec3,
    listener_position: Vec3,
    listener_forward: Vec3,
    channel: Channel,
) -> f32 {
    let displacement = call_position - listener_position;
    let distance = displacement.length();
    if distance <= f32::EPSILON {
        // Direction is undefined on top of the listener; pan dead center.
        return 0.5;
    }
    let direction = displacement / distance;
    let left = Quat::from_rotation_y(FRAC_PI_2) * listener_forward;
    let side = match channel {
        Channel::Left => left,
        Channel::Right => -left,
    };
    (side.dot(direction) + 1.0) * 0.5
}

/// Combined balance and inverse-distance gain for one call/channel pair.
///
/// Constant across a chunk for a frozen snapshot, so callers mixing many
/// samples of the same call can compute it once per channel.
pub fn channel_gain(
    call_position: Vec3,
    listener_position: Vec3,
    listener_forward: Vec3,
    channel: Channel,
) -> f32 {
    let distance = (call_position - listener_position).length();
    let balance = channel_balance(call_position, listener_position, listener_forward, channel);
    balance / distance.max(DISTANCE_FLOOR)
}

// TODO: factor call and listener velocities into a Doppler pitch stage.
/// Spatializes a single mono sample into one output channel.
pub fn attenuate(
    sample: f32,
    call_position: Vec3,
    listener_position: Vec3,
    listener_forward: Vec3,
    channel: Channel,
) -> f32 {
    sample * channel_gain(call_position, listener_position, listener_forward, channel)
}
