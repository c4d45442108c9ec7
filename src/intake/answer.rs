//! Decoding raw replies into step answers.
//!
//! Transitions match on [`Answer`] variants; the Russian labels only live in
//! the choice tables and prompts.

use super::model::{AgeGroup, Branch, PriorVisit};
use super::state::IntakeStep;

/// Label of the back button.
pub const BACK_LABEL: &str = "⬅️ Назад";

/// A recognised quick-reply choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    PriorVisit(PriorVisit),
    Branch(Branch),
    AgeGroup(AgeGroup),
}

impl Choice {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PriorVisit(v) => v.label(),
            Self::Branch(b) => b.label(),
            Self::AgeGroup(g) => g.label(),
        }
    }
}

/// A reply to the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Return to the previous step.
    Back,
    /// One of the offered buttons.
    Choice(Choice),
    /// Anything else, trimmed. Accepted as-is.
    Text(String),
}

impl Answer {
    /// Decode `raw` as a reply to `step`.
    pub fn decode(step: IntakeStep, raw: &str) -> Self {
        let text = raw.trim();

        if step.accepts_back() && text == BACK_LABEL {
            return Self::Back;
        }

        let choice = match step {
            IntakeStep::AwaitingPriorVisit => PriorVisit::ALL
                .into_iter()
                .find(|v| v.label() == text)
                .map(Choice::PriorVisit),
            IntakeStep::AwaitingBranch => Branch::ALL
                .into_iter()
                .find(|b| b.label() == text)
                .map(Choice::Branch),
            IntakeStep::AwaitingAgeGroup => AgeGroup::from_label(text).map(Choice::AgeGroup),
            _ => None,
        };

        match choice {
            Some(choice) => Self::Choice(choice),
            None => Self::Text(text.to_string()),
        }
    }

    /// The value to store, or `None` for a back token.
    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Back => None,
            Self::Choice(choice) => Some(choice.label().to_string()),
            Self::Text(text) => Some(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_label_decodes_to_back() {
        assert_eq!(Answer::decode(IntakeStep::AwaitingBranch, BACK_LABEL), Answer::Back);
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingPhone, &format!("  {BACK_LABEL} ")),
            Answer::Back
        );
    }

    #[test]
    fn back_label_is_text_on_first_step() {
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingName, BACK_LABEL),
            Answer::Text(BACK_LABEL.into())
        );
    }

    #[test]
    fn buttons_decode_to_choices() {
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingPriorVisit, "Да"),
            Answer::Choice(Choice::PriorVisit(PriorVisit::Yes))
        );
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingBranch, "ул. Новосёлов, 105"),
            Answer::Choice(Choice::Branch(Branch::Novoselov105))
        );
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingAgeGroup, "10+ лет"),
            Answer::Choice(Choice::AgeGroup(AgeGroup::TenPlus))
        );
    }

    #[test]
    fn labels_only_match_their_own_step() {
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingBranch, "Да"),
            Answer::Text("Да".into())
        );
    }

    #[test]
    fn free_text_is_trimmed_and_kept() {
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingPriorVisit, "  наверное  "),
            Answer::Text("наверное".into())
        );
        assert_eq!(
            Answer::decode(IntakeStep::AwaitingChildInfo, "   "),
            Answer::Text(String::new())
        );
    }

    #[test]
    fn stored_value_is_the_literal_label() {
        let answer = Answer::decode(IntakeStep::AwaitingAgeGroup, " 7–9 лет ");
        assert_eq!(answer.into_value().as_deref(), Some("7–9 лет"));
        assert_eq!(Answer::Back.into_value(), None);
    }
}
