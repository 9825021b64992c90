//! The remote steps of a capture and how long to block on each.

use std::fmt;

/// A remote call issued against the virtual machine.
///
/// Steps always run in the order of [`CaptureStep::ALL`]; each one relies on
/// the previous one having been accepted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureStep {
    /// Stop the VM and release its compute resources, keeping the disk.
    Deallocate,
    /// Mark the OS disk as a template source.
    Generalize,
    /// Copy the generalized disk into the destination container.
    Capture,
}

impl CaptureStep {
    /// Every step, in execution order.
    pub const ALL: [CaptureStep; 3] = [Self::Deallocate, Self::Generalize, Self::Capture];

    /// Action segment used in the management API path.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Deallocate => "deallocate",
            Self::Generalize => "generalize",
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}

/// Whether the sequencer blocks until a step completes remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until the service reports completion.
    Wait,
    /// Continue as soon as the service accepted the request.
    NoWait,
}

/// Per-step wait policies for a capture run.
///
/// The default waits on deallocate and capture but not on generalize; the
/// compute API accepts a capture request right after generalize was
/// submitted.
///
/// ```
/// use azure_image_capture::{CapturePlan, CaptureStep, WaitPolicy};
///
/// let plan = CapturePlan::default().with_policy(CaptureStep::Generalize, WaitPolicy::Wait);
/// assert_eq!(plan.policy(CaptureStep::Generalize), WaitPolicy::Wait);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePlan {
    deallocate: WaitPolicy,
    generalize: WaitPolicy,
    capture: WaitPolicy,
}

impl Default for CapturePlan {
    fn default() -> Self {
        Self {
            deallocate: WaitPolicy::Wait,
            generalize: WaitPolicy::NoWait,
            capture: WaitPolicy::Wait,
        }
    }
}

impl CapturePlan {
    /// Overrides the wait policy of one step.
    pub fn with_policy(mut self, step: CaptureStep, policy: WaitPolicy) -> Self {
        match step {
            CaptureStep::Deallocate => self.deallocate = policy,
            CaptureStep::Generalize => self.generalize = policy,
            CaptureStep::Capture => self.capture = policy,
        }
        self
    }

    /// Returns the wait policy of a step.
    pub fn policy(&self, step: CaptureStep) -> WaitPolicy {
        match step {
            CaptureStep::Deallocate => self.deallocate,
            CaptureStep::Generalize => self.generalize,
            CaptureStep::Capture => self.capture,
        }
    }

    /// Steps paired with their policies, in execution order.
    pub fn stages(&self) -> impl Iterator<Item = (CaptureStep, WaitPolicy)> + '_ {
        CaptureStep::ALL.into_iter().map(|step| (step, self.policy(step)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_skips_generalize_wait() {
        let plan = CapturePlan::default();
        let stages: Vec<_> = plan.stages().collect();

        assert_eq!(
            stages,
            vec![
                (CaptureStep::Deallocate, WaitPolicy::Wait),
                (CaptureStep::Generalize, WaitPolicy::NoWait),
                (CaptureStep::Capture, WaitPolicy::Wait),
            ]
        );
    }

    #[test]
    fn test_override_keeps_order() {
        let plan = CapturePlan::default()
            .with_policy(CaptureStep::Generalize, WaitPolicy::Wait)
            .with_policy(CaptureStep::Deallocate, WaitPolicy::NoWait);

        let steps: Vec<_> = plan.stages().map(|(step, _)| step).collect();
        assert_eq!(steps, CaptureStep::ALL.to_vec());
        assert_eq!(plan.policy(CaptureStep::Deallocate), WaitPolicy::NoWait);
        assert_eq!(plan.policy(CaptureStep::Capture), WaitPolicy::Wait);
    }

    #[test]
    fn test_step_display() {
        assert_eq!(CaptureStep::Deallocate.to_string(), "deallocate");
        assert_eq!(CaptureStep::Generalize.to_string(), "generalize");
        assert_eq!(CaptureStep::Capture.to_string(), "capture");
    }
}
