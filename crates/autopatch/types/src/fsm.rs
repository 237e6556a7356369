//! Finite-state machine support for status and phase fields

use crate::error::TransitionError;
use std::fmt::Display;

/// A status type with a fixed set of legal transitions.
pub trait StateMachine: Copy + PartialEq + Display {
    /// Machine name used in error messages.
    const MACHINE: &'static str;

    /// Whether `next` is a legal successor of `self`.
    fn can_transition_to(&self, next: &Self) -> bool;

    /// Whether no further transition is possible.
    fn is_terminal(&self) -> bool;

    /// Move to `next`, rejecting illegal transitions.
    fn transition_to(&mut self, next: Self) -> Result<(), TransitionError> {
        if !self.can_transition_to(&next) {
            return Err(TransitionError::Illegal {
                machine: Self::MACHINE,
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}
