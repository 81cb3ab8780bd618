//! Outcomes of gateway manipulations.
//!
//! Failures here are expected gameplay outcomes (out of range, not enough
//! energy), so they are a closed enum rather than errors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one manipulation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionResult {
    Success,
    /// The target lies outside the caster's control range.
    OutsideRange,
    /// The caster cannot pay the total cost.
    NotEnoughEnergy,
    /// The manifestation handle is stale or names something else.
    InvalidManifestation,
    /// A non-manifestation argument is stale or of the wrong kind.
    InvalidObject,
    /// The request would not change anything.
    RedundantAction,
    /// The request is illegal in the current state (sealed, foreign, ...).
    ForbiddenAction,
    /// Validation passed but the underlying mutation refused.
    SubactionFailed,
    /// The operation requires contact that does not exist.
    NoContact,
    /// The request would withdraw more energy than is available.
    ExtractingTooMuch,
    UndefinedError,
}

impl ActionResult {
    /// `Success` only.
    #[inline]
    pub fn try_strict(self) -> bool {
        self == ActionResult::Success
    }

    /// `Success` or `RedundantAction`.
    #[inline]
    pub fn try_tolerant(self) -> bool {
        matches!(self, ActionResult::Success | ActionResult::RedundantAction)
    }
}

/// `result == Success`.
#[inline]
pub fn try_strict(result: ActionResult) -> bool {
    result.try_strict()
}

/// `result == Success || result == RedundantAction`.
#[inline]
pub fn try_(result: ActionResult) -> bool {
    result.try_tolerant()
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ActionResult::Success => "success",
            ActionResult::OutsideRange => "outside range",
            ActionResult::NotEnoughEnergy => "not enough energy",
            ActionResult::InvalidManifestation => "invalid manifestation",
            ActionResult::InvalidObject => "invalid object",
            ActionResult::RedundantAction => "redundant action",
            ActionResult::ForbiddenAction => "forbidden action",
            ActionResult::SubactionFailed => "subaction failed",
            ActionResult::NoContact => "no contact",
            ActionResult::ExtractingTooMuch => "extracting too much",
            ActionResult::UndefinedError => "undefined error",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_accepts_only_success() {
        assert!(try_strict(ActionResult::Success));
        assert!(!try_strict(ActionResult::RedundantAction));
        assert!(!try_strict(ActionResult::NotEnoughEnergy));
    }

    #[test]
    fn tolerant_accepts_redundant() {
        assert!(try_(ActionResult::Success));
        assert!(try_(ActionResult::RedundantAction));
        assert!(!try_(ActionResult::ForbiddenAction));
        assert!(!try_(ActionResult::OutsideRange));
    }

    #[test]
    fn display_is_lowercase_prose() {
        assert_eq!(ActionResult::ExtractingTooMuch.to_string(), "extracting too much");
    }
}
