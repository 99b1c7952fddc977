//! Read-only joint state sampler.
//!
//! Claims nothing, so it can run next to any other controller. Samples
//! every listed joint (default: all joints) at `publish_rate` Hz into a
//! pre-allocated buffer and emits them at `trace` level.

use rtcm_common::controller::{Controller, ControllerError, InitContext};
use rtcm_common::hardware::JointHandle;
use rtcm_common::types::{ClaimedResources, InterfaceKind};
use std::time::{Duration, Instant};
use tracing::trace;

const DEFAULT_PUBLISH_RATE_HZ: f64 = 50.0;

/// One sampled joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JointSample {
    pub position: f64,
    pub velocity: f64,
    pub effort: f64,
}

/// `JointStateController`.
pub struct JointStateController {
    joints: Vec<JointHandle>,
    samples: Vec<JointSample>,
    interval: Duration,
    last_publish: Option<Instant>,
    published: u64,
}

impl JointStateController {
    pub const TYPE_NAME: &'static str = "JointStateController";

    pub fn new() -> Self {
        Self {
            joints: Vec::new(),
            samples: Vec::new(),
            interval: Duration::from_secs_f64(1.0 / DEFAULT_PUBLISH_RATE_HZ),
            last_publish: None,
            published: 0,
        }
    }

    pub fn create() -> Box<dyn Controller> {
        Box::new(Self::new())
    }

    /// Latest samples, in joint order.
    pub fn samples(&self) -> &[JointSample] {
        &self.samples
    }

    /// Number of publications since load.
    pub fn published(&self) -> u64 {
        self.published
    }
}

impl Default for JointStateController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for JointStateController {
    fn init_request(
        &mut self,
        ctx: &InitContext<'_>,
        _claimed: &mut ClaimedResources,
    ) -> Result<(), ControllerError> {
        let names = match ctx.str_list_param("joints")? {
            Some(names) => names,
            None => ctx
                .hardware()
                .resource_names(InterfaceKind::JointState)
                .map(String::from)
                .collect(),
        };
        let rate = ctx.f64_param("publish_rate")?.unwrap_or(DEFAULT_PUBLISH_RATE_HZ);
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ControllerError::InvalidParameter {
                name: "publish_rate".to_string(),
                reason: format!("{rate} is not a positive rate"),
            });
        }

        self.joints = names
            .iter()
            .map(|name| ctx.state_handle(name))
            .collect::<Result<_, _>>()?;
        self.samples = vec![JointSample::default(); self.joints.len()];
        self.interval = Duration::from_secs_f64(1.0 / rate);
        Ok(())
    }

    fn starting(&mut self, _now: Instant) -> Result<(), ControllerError> {
        self.last_publish = None;
        Ok(())
    }

    fn update(&mut self, now: Instant, _period: Duration) -> Result<(), ControllerError> {
        let due = self
            .last_publish
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            return Ok(());
        }
        for (sample, joint) in self.samples.iter_mut().zip(&self.joints) {
            *sample = JointSample {
                position: joint.position(),
                velocity: joint.velocity(),
                effort: joint.effort(),
            };
            trace!(
                joint = joint.name(),
                position = sample.position,
                velocity = sample.velocity,
                effort = sample.effort,
                "joint state"
            );
        }
        self.last_publish = Some(now);
        self.published += 1;
        Ok(())
    }
}
