//! Fighter state machine
//!
//! `Idle -> Engaged -> {Victorious, Defeated, Fled, Disengaged} -> Idle`
//!
//! The state stored on a [`Player`](super::player::Player) is the only record
//! of whether they are in combat; the combat engine's per-fighter records are
//! kept in step with it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FighterState {
    #[default]
    Idle,
    Engaged,
    Victorious,
    Defeated,
    Fled,
    Disengaged,
}

impl FighterState {
    pub const ALL: [FighterState; 6] = [
        FighterState::Idle,
        FighterState::Engaged,
        FighterState::Victorious,
        FighterState::Defeated,
        FighterState::Fled,
        FighterState::Disengaged,
    ];

    /// The transition table
    pub fn can_transition(self, to: FighterState) -> bool {
        use FighterState::*;
        matches!(
            (self, to),
            (Idle, Engaged)
                | (Engaged, Victorious)
                | (Engaged, Defeated)
                | (Engaged, Fled)
                | (Engaged, Disengaged)
                | (Victorious, Idle)
                | (Defeated, Idle)
                | (Fled, Idle)
                | (Disengaged, Idle)
        )
    }

    pub fn is_engaged(self) -> bool {
        self == FighterState::Engaged
    }

    /// Terminal outcome states only exist for the duration of one resolution
    pub fn is_outcome(self) -> bool {
        matches!(
            self,
            FighterState::Victorious
                | FighterState::Defeated
                | FighterState::Fled
                | FighterState::Disengaged
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FighterState::Idle => "idle",
            FighterState::Engaged => "engaged",
            FighterState::Victorious => "victorious",
            FighterState::Defeated => "defeated",
            FighterState::Fled => "fled",
            FighterState::Disengaged => "disengaged",
        }
    }
}

/// Why a fighter leaves an encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatExit {
    Victory,
    Defeat,
    Flee,
    Disconnect,
}

impl CombatExit {
    /// The outcome state this exit passes through
    pub fn outcome(self) -> FighterState {
        match self {
            CombatExit::Victory => FighterState::Victorious,
            CombatExit::Defeat => FighterState::Defeated,
            CombatExit::Flee => FighterState::Fled,
            CombatExit::Disconnect => FighterState::Disengaged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal fighter transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: FighterState,
    pub to: FighterState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn every_exit_lands_back_on_idle() {
        for exit in [
            CombatExit::Victory,
            CombatExit::Defeat,
            CombatExit::Flee,
            CombatExit::Disconnect,
        ] {
            let out = exit.outcome();
            assert!(FighterState::Engaged.can_transition(out));
            assert!(out.can_transition(FighterState::Idle));
            assert!(out.is_outcome());
        }
    }

    #[test]
    fn idle_cannot_skip_engagement() {
        assert!(!FighterState::Idle.can_transition(FighterState::Fled));
        assert!(!FighterState::Idle.can_transition(FighterState::Victorious));
        assert!(!FighterState::Engaged.can_transition(FighterState::Engaged));
    }

    fn any_state() -> impl Strategy<Value = FighterState> {
        (0..FighterState::ALL.len()).prop_map(|i| FighterState::ALL[i])
    }

    proptest! {
        #[test]
        fn walks_of_legal_transitions_never_stack_outcomes(
            steps in proptest::collection::vec(any_state(), 0..64)
        ) {
            let mut state = FighterState::Idle;
            for to in steps {
                if state.can_transition(to) {
                    // An outcome is always followed by Idle, never another outcome
                    if state.is_outcome() {
                        prop_assert_eq!(to, FighterState::Idle);
                    }
                    state = to;
                }
            }
        }
    }
}
