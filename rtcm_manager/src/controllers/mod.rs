//! Built-in controllers.
//!
//! - [`JointStateController`] - read-only, samples joint state at a fixed rate
//! - [`JointPositionController`] - forwards position setpoints
//! - [`JointVelocityController`] - forwards velocity setpoints

mod forward_command;
mod joint_state;

pub use forward_command::{ForwardCommandController, JointPositionController, JointVelocityController};
pub use joint_state::{JointSample, JointStateController};
