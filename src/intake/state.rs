//! Intake state machine: which answer the bot is waiting for.

use serde::{Deserialize, Serialize};

/// The steps of the intake conversation.
///
/// Progresses linearly: AwaitingName → AwaitingPriorVisit → AwaitingBranch →
/// AwaitingAgeGroup → AwaitingTimeSlot → AwaitingChildInfo → AwaitingPhone →
/// Done. Every step after the first can also step back by one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStep {
    #[default]
    AwaitingName,
    AwaitingPriorVisit,
    AwaitingBranch,
    AwaitingAgeGroup,
    AwaitingTimeSlot,
    AwaitingChildInfo,
    AwaitingPhone,
    Done,
}

impl IntakeStep {
    /// Every step in conversation order.
    pub const ALL: [IntakeStep; 8] = [
        Self::AwaitingName,
        Self::AwaitingPriorVisit,
        Self::AwaitingBranch,
        Self::AwaitingAgeGroup,
        Self::AwaitingTimeSlot,
        Self::AwaitingChildInfo,
        Self::AwaitingPhone,
        Self::Done,
    ];

    /// Whether this step is terminal (the form is submitted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Get the next step in the linear progression, if any.
    pub fn next(&self) -> Option<IntakeStep> {
        use IntakeStep::*;
        match self {
            AwaitingName => Some(AwaitingPriorVisit),
            AwaitingPriorVisit => Some(AwaitingBranch),
            AwaitingBranch => Some(AwaitingAgeGroup),
            AwaitingAgeGroup => Some(AwaitingTimeSlot),
            AwaitingTimeSlot => Some(AwaitingChildInfo),
            AwaitingChildInfo => Some(AwaitingPhone),
            AwaitingPhone => Some(Done),
            Done => None,
        }
    }

    /// The step a back token returns to, if any.
    pub fn previous(&self) -> Option<IntakeStep> {
        use IntakeStep::*;
        match self {
            AwaitingName => None,
            AwaitingPriorVisit => Some(AwaitingName),
            AwaitingBranch => Some(AwaitingPriorVisit),
            AwaitingAgeGroup => Some(AwaitingBranch),
            AwaitingTimeSlot => Some(AwaitingAgeGroup),
            AwaitingChildInfo => Some(AwaitingTimeSlot),
            AwaitingPhone => Some(AwaitingChildInfo),
            Done => Some(AwaitingPhone),
        }
    }

    /// Whether a back token means "go back" here rather than plain text.
    pub fn accepts_back(&self) -> bool {
        !self.is_terminal() && self.previous().is_some()
    }
}

impl std::fmt::Display for IntakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingName => "awaiting_name",
            Self::AwaitingPriorVisit => "awaiting_prior_visit",
            Self::AwaitingBranch => "awaiting_branch",
            Self::AwaitingAgeGroup => "awaiting_age_group",
            Self::AwaitingTimeSlot => "awaiting_time_slot",
            Self::AwaitingChildInfo => "awaiting_child_info",
            Self::AwaitingPhone => "awaiting_phone",
            Self::Done => "done",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions() {
        use IntakeStep::*;
        let transitions = [
            (AwaitingName, AwaitingPriorVisit),
            (AwaitingPriorVisit, AwaitingBranch),
            (AwaitingBranch, AwaitingAgeGroup),
            (AwaitingAgeGroup, AwaitingTimeSlot),
            (AwaitingTimeSlot, AwaitingChildInfo),
            (AwaitingChildInfo, AwaitingPhone),
            (AwaitingPhone, Done),
        ];
        for (from, to) in transitions {
            assert_eq!(from.next(), Some(to), "{from} should advance to {to}");
            assert_eq!(to.previous(), Some(from), "{to} should step back to {from}");
        }
    }

    #[test]
    fn default_is_first_question() {
        assert_eq!(IntakeStep::default(), IntakeStep::AwaitingName);
        assert_eq!(IntakeStep::default(), IntakeStep::ALL[0]);
    }

    #[test]
    fn back_is_refused_at_the_edges() {
        assert!(!IntakeStep::AwaitingName.accepts_back());
        assert!(!IntakeStep::Done.accepts_back());
        assert!(IntakeStep::AwaitingPriorVisit.accepts_back());
        assert!(IntakeStep::AwaitingPhone.accepts_back());
    }

    #[test]
    fn next_walks_all_steps() {
        let mut current = IntakeStep::default();
        for expected in &IntakeStep::ALL[1..] {
            let next = current.next().unwrap();
            assert_eq!(next, *expected);
            assert_eq!(next.previous(), Some(current));
            current = next;
        }
        assert!(current.next().is_none());
        assert!(current.is_terminal());
    }

    #[test]
    fn seven_steps_collect_answers() {
        let answering = IntakeStep::ALL.iter().filter(|s| !s.is_terminal()).count();
        assert_eq!(answering, 7);
    }

    #[test]
    fn display_matches_serde() {
        for step in IntakeStep::ALL {
            let display = format!("{step}");
            let json = serde_json::to_string(&step).unwrap();
            assert_eq!(
                format!("\"{display}\""),
                json,
                "Display and serde should match for {step:?}"
            );
        }
    }
}
