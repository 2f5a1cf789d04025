//! Onboarding progress: which step a role profile is on and what may be submitted next.

use serde::Serialize;

use crate::auth::model::{RoleProfile, UserType};
use crate::error::OnboardingError;

/// Step progress of one role's onboarding flow.
///
/// Steps are numbered from 1. `step` is the last step submitted (0 before
/// the first). Earlier steps may be submitted again, which is how edit mode
/// revises answers; skipping ahead is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OnboardingProgress {
    pub role: UserType,
    pub step: u32,
    pub total: u32,
    pub completed: bool,
}

/// Result of accepting one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A new step was reached.
    Advanced,
    /// An already-submitted step was revised.
    Revised,
    /// The final step was reached for the first time.
    Completed,
}

impl OnboardingProgress {
    pub fn new(role: UserType, total: u32) -> Self {
        Self {
            role,
            step: 0,
            total,
            completed: false,
        }
    }

    pub fn of(profile: &RoleProfile, total: u32) -> Self {
        Self {
            role: profile.role,
            step: profile.onboarding_step,
            total,
            completed: profile.onboarding_completed,
        }
    }

    /// Whether `step` may be submitted now.
    pub fn can_submit(&self, step: u32) -> bool {
        step >= 1 && step <= self.total && step <= self.step.saturating_add(1)
    }

    /// The step a user should see next, if any remain.
    pub fn next(&self) -> Option<u32> {
        (!self.completed && self.step < self.total).then_some(self.step + 1)
    }

    pub fn is_terminal(&self) -> bool {
        self.completed
    }

    /// Accept `step`, moving progress forward when it is new.
    pub fn submit(&mut self, step: u32) -> Result<StepOutcome, OnboardingError> {
        if !self.can_submit(step) {
            return Err(OnboardingError::InvalidStep {
                step,
                expected: self.next().unwrap_or(self.total),
                total: self.total,
            });
        }
        if step <= self.step {
            return Ok(StepOutcome::Revised);
        }
        self.step = step;
        if step == self.total && !self.completed {
            self.completed = true;
            return Ok(StepOutcome::Completed);
        }
        Ok(StepOutcome::Advanced)
    }

    /// Copy progress onto a role profile.
    pub fn apply_to(&self, profile: &mut RoleProfile) {
        profile.onboarding_step = self.step;
        profile.onboarding_completed = self.completed;
    }
}

impl std::fmt::Display for OnboardingProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.role, self.step, self.total)?;
        if self.completed {
            write!(f, " (complete)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_all_steps() {
        let mut progress = OnboardingProgress::new(UserType::Mentor, 4);
        for step in 1..4 {
            assert_eq!(progress.next(), Some(step));
            assert_eq!(progress.submit(step).unwrap(), StepOutcome::Advanced);
        }
        assert_eq!(progress.submit(4).unwrap(), StepOutcome::Completed);
        assert!(progress.is_terminal());
        assert_eq!(progress.next(), None);
    }

    #[test]
    fn invalid_steps() {
        let mut progress = OnboardingProgress::new(UserType::Mentee, 3);
        // Skip ahead
        assert!(matches!(
            progress.submit(2),
            Err(OnboardingError::InvalidStep { step: 2, expected: 1, total: 3 })
        ));
        // Zero and past the end
        assert!(!progress.can_submit(0));
        progress.step = 3;
        assert!(!progress.can_submit(4));
    }

    #[test]
    fn earlier_steps_can_be_revised() {
        let mut progress = OnboardingProgress::new(UserType::Mentee, 3);
        progress.submit(1).unwrap();
        progress.submit(2).unwrap();
        assert_eq!(progress.submit(1).unwrap(), StepOutcome::Revised);
        assert_eq!(progress.step, 2);
    }

    #[test]
    fn completed_flow_stays_complete_on_revision() {
        let mut progress = OnboardingProgress {
            role: UserType::Mentee,
            step: 3,
            total: 3,
            completed: true,
        };
        assert_eq!(progress.submit(3).unwrap(), StepOutcome::Revised);
        assert_eq!(progress.submit(2).unwrap(), StepOutcome::Revised);
        assert!(progress.completed);
    }

    #[test]
    fn display() {
        let mut progress = OnboardingProgress::new(UserType::Mentor, 4);
        assert_eq!(progress.to_string(), "mentor 0/4");
        progress.step = 4;
        progress.completed = true;
        assert_eq!(progress.to_string(), "mentor 4/4 (complete)");
    }
}
