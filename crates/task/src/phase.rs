//! Lifecycle phases of a repeated timer task.
//!
//! The four observable flags (`stopped`, `running`, `invoking`, `destroyed`)
//! are derived from a single [`Phase`] rather than stored separately, so
//! combinations such as "invoking but not running" cannot be represented.

use metronome_core::TimerHandle;
use std::time::Instant;

/// What happens once an in-flight fire finishes running the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AfterFire {
    /// Arm the next fire.
    Rearm,
    /// Go idle; a later `start` arms again.
    Idle,
    /// Finalize the task.
    Finalize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Nothing registered, nothing in flight.
    Idle,

    /// One registration outstanding with the scheduler.
    Armed { handle: TimerHandle, due: Instant },

    /// The scheduler has committed to a fire (a cancel lost the race, or
    /// registration failed and the fire was delivered directly) but the
    /// action has not started yet.
    InFlight { due: Instant, then: AfterFire },

    /// The action is executing.
    Invoking { then: AfterFire },

    /// Destroyed with nothing in flight. Terminal until re-initialized.
    Destroyed,
}

impl Phase {
    pub(crate) fn is_stopped(&self) -> bool {
        match self {
            Phase::Idle | Phase::Destroyed => true,
            Phase::Armed { .. } => false,
            Phase::InFlight { then, .. } | Phase::Invoking { then } => *then != AfterFire::Rearm,
        }
    }

    /// A registration or fire still belongs to the task.
    pub(crate) fn is_running(&self) -> bool {
        matches!(
            self,
            Phase::Armed { .. } | Phase::InFlight { .. } | Phase::Invoking { .. }
        )
    }

    pub(crate) fn is_invoking(&self) -> bool {
        matches!(self, Phase::Invoking { .. })
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        match self {
            Phase::Destroyed => true,
            Phase::Idle | Phase::Armed { .. } => false,
            Phase::InFlight { then, .. } | Phase::Invoking { then } => *then == AfterFire::Finalize,
        }
    }

    /// Due time of the next fire, if one is pending and not yet executing.
    pub(crate) fn due(&self) -> Option<Instant> {
        match self {
            Phase::Armed { due, .. } | Phase::InFlight { due, .. } => Some(*due),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_phases() -> Vec<Phase> {
        let due = Instant::now();
        let mut phases = vec![
            Phase::Idle,
            Phase::Armed {
                handle: TimerHandle::new(1),
                due,
            },
            Phase::Destroyed,
        ];
        for then in [AfterFire::Rearm, AfterFire::Idle, AfterFire::Finalize] {
            phases.push(Phase::InFlight { due, then });
            phases.push(Phase::Invoking { then });
        }
        phases
    }

    #[test]
    fn test_flag_implications_hold_in_every_phase() {
        for phase in all_phases() {
            if phase.is_destroyed() {
                assert!(phase.is_stopped(), "{phase:?}");
            }
            if phase.is_invoking() {
                assert!(phase.is_running(), "{phase:?}");
            }
            if phase.due().is_some() {
                assert!(phase.is_running() && !phase.is_invoking(), "{phase:?}");
            }
        }
    }

    #[test]
    fn test_pending_fire_flags() {
        let due = Instant::now();

        let rearm = Phase::InFlight {
            due,
            then: AfterFire::Rearm,
        };
        assert!(rearm.is_running());
        assert!(!rearm.is_stopped());

        let stopping = Phase::Invoking {
            then: AfterFire::Idle,
        };
        assert!(stopping.is_running());
        assert!(stopping.is_stopped());
        assert!(!stopping.is_destroyed());

        let destroying = Phase::Invoking {
            then: AfterFire::Finalize,
        };
        assert!(destroying.is_destroyed());
        assert!(destroying.is_invoking());
    }
}
