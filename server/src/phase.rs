//! Lobby -> Starting -> Drawing -> Ended -> Lobby.
//!
//! The machine only knows which triggers are legal in which phase.
//! Authorization and player counts are checked by the session before a
//! trigger is fired.

use log::{debug, warn};
use shared::{SessionError, SessionPhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTrigger {
    Start,
    Settled,
    Exhausted,
    WinAccepted,
    Reset,
}

pub struct SessionPhaseMachine {
    phase: SessionPhase,
}

impl Default for SessionPhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Lobby,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is(&self, phase: SessionPhase) -> bool {
        self.phase == phase
    }

    /// Fires a trigger. Illegal triggers leave the phase untouched.
    pub fn fire(&mut self, trigger: PhaseTrigger) -> Result<SessionPhase, SessionError> {
        let next = match (self.phase, trigger) {
            (SessionPhase::Lobby, PhaseTrigger::Start) => SessionPhase::Starting,
            (SessionPhase::Starting, PhaseTrigger::Settled) => SessionPhase::Drawing,
            (SessionPhase::Drawing, PhaseTrigger::Exhausted) => SessionPhase::Ended,
            (SessionPhase::Drawing, PhaseTrigger::WinAccepted) => SessionPhase::Ended,
            (SessionPhase::Ended, PhaseTrigger::Reset) => SessionPhase::Lobby,
            (phase, trigger) => {
                warn!("Illegal transition {:?} from {:?}", trigger, phase);
                return Err(SessionError::IllegalTransition);
            }
        };

        debug!("Phase {:?} -> {:?} ({:?})", self.phase, next, trigger);
        self.phase = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_cycle() {
        let mut machine = SessionPhaseMachine::new();
        assert_eq!(machine.phase(), SessionPhase::Lobby);

        assert_eq!(machine.fire(PhaseTrigger::Start), Ok(SessionPhase::Starting));
        assert_eq!(machine.fire(PhaseTrigger::Settled), Ok(SessionPhase::Drawing));
        assert_eq!(machine.fire(PhaseTrigger::Exhausted), Ok(SessionPhase::Ended));
        assert_eq!(machine.fire(PhaseTrigger::Reset), Ok(SessionPhase::Lobby));
    }

    #[test]
    fn test_win_ends_drawing() {
        let mut machine = SessionPhaseMachine::new();
        machine.fire(PhaseTrigger::Start).unwrap();
        machine.fire(PhaseTrigger::Settled).unwrap();
        assert_eq!(machine.fire(PhaseTrigger::WinAccepted), Ok(SessionPhase::Ended));
        assert!(machine.is(SessionPhase::Ended));
    }

    #[test]
    fn test_illegal_triggers_are_noops() {
        let mut machine = SessionPhaseMachine::new();

        for trigger in [
            PhaseTrigger::Settled,
            PhaseTrigger::Exhausted,
            PhaseTrigger::WinAccepted,
            PhaseTrigger::Reset,
        ] {
            assert_eq!(machine.fire(trigger), Err(SessionError::IllegalTransition));
            assert_eq!(machine.phase(), SessionPhase::Lobby);
        }

        machine.fire(PhaseTrigger::Start).unwrap();
        assert_eq!(
            machine.fire(PhaseTrigger::Start),
            Err(SessionError::IllegalTransition)
        );
        assert_eq!(
            machine.fire(PhaseTrigger::WinAccepted),
            Err(SessionError::IllegalTransition)
        );
        assert_eq!(machine.phase(), SessionPhase::Starting);
    }

    #[test]
    fn test_second_win_after_end_is_illegal() {
        let mut machine = SessionPhaseMachine::new();
        machine.fire(PhaseTrigger::Start).unwrap();
        machine.fire(PhaseTrigger::Settled).unwrap();
        machine.fire(PhaseTrigger::WinAccepted).unwrap();
        assert_eq!(
            machine.fire(PhaseTrigger::WinAccepted),
            Err(SessionError::IllegalTransition)
        );
    }
}
