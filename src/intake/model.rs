//! Submission record and the fixed choice tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::IntakeStep;

/// How the phone number reached us.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneSource {
    /// Typed as a message.
    Typed,
    /// Shared through the contact button.
    SharedContact,
}

/// Answers collected from one user's booking attempt.
///
/// A field stays `None` until its step has received a non-back answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub been_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_slot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_source: Option<PhoneSource>,
}

impl Default for Submission {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            parent_name: None,
            been_before: None,
            branch: None,
            age_group: None,
            time_slot: None,
            child_info: None,
            phone: None,
            phone_source: None,
        }
    }
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the answer for `step`. The phone step also needs a source, see
    /// [`Submission::record_phone`]; `Done` has no field.
    pub fn record(&mut self, step: IntakeStep, value: String) {
        let slot = match step {
            IntakeStep::AwaitingName => &mut self.parent_name,
            IntakeStep::AwaitingPriorVisit => &mut self.been_before,
            IntakeStep::AwaitingBranch => &mut self.branch,
            IntakeStep::AwaitingAgeGroup => &mut self.age_group,
            IntakeStep::AwaitingTimeSlot => &mut self.time_slot,
            IntakeStep::AwaitingChildInfo => &mut self.child_info,
            IntakeStep::AwaitingPhone => {
                self.record_phone(value, PhoneSource::Typed);
                return;
            }
            IntakeStep::Done => return,
        };
        *slot = Some(value);
    }

    pub fn record_phone(&mut self, phone: String, source: PhoneSource) {
        self.phone = Some(phone);
        self.phone_source = Some(source);
    }
}

// ── Choice tables ───────────────────────────────────────────────────

/// "Have you been here before?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorVisit {
    Yes,
    No,
}

impl PriorVisit {
    pub const ALL: [PriorVisit; 2] = [Self::Yes, Self::No];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Yes => "Да",
            Self::No => "Нет",
        }
    }
}

/// Workshop branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Novoselov105,
}

impl Branch {
    pub const ALL: [Branch; 1] = [Self::Novoselov105];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Novoselov105 => "ул. Новосёлов, 105",
        }
    }
}

/// Children's age groups, each with its own timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeGroup {
    FourToSix,
    SevenToNine,
    TenPlus,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 3] = [Self::FourToSix, Self::SevenToNine, Self::TenPlus];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FourToSix => "4–6 лет",
            Self::SevenToNine => "7–9 лет",
            Self::TenPlus => "10+ лет",
        }
    }

    /// Look up a group by its exact button label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.label() == label)
    }

    /// Time slots offered to this group, in display order.
    pub fn time_slots(&self) -> &'static [&'static str] {
        match self {
            Self::FourToSix => &["Четверг 17:30", "Суббота 10:00", "Воскресенье 10:00"],
            Self::SevenToNine => &[
                "Вторник 17:30",
                "Четверг 17:30",
                "Суббота 11:45",
                "Воскресенье 11:45",
            ],
            Self::TenPlus => &[
                "Понедельник 18:00",
                "Среда 18:00",
                "Пятница 18:00",
                "Суббота 13:30",
                "Воскресенье 13:30",
            ],
        }
    }
}

/// Slots offered when the age group was typed free-form.
pub const DEFAULT_TIME_SLOTS: &[&str] = &["Четверг 17:30", "Суббота 10:00", "Воскресенье 10:00"];

/// Time slots for a stored age-group answer.
pub fn time_slots_for(age_group: Option<&str>) -> &'static [&'static str] {
    age_group
        .and_then(AgeGroup::from_label)
        .map(|g| g.time_slots())
        .unwrap_or(DEFAULT_TIME_SLOTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_submission_is_empty() {
        let sub = Submission::new();
        let json = serde_json::to_value(&sub).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 2, "only id and created_at are set: {keys:?}");
        assert!(sub.phone_source.is_none());
    }

    #[test]
    fn record_sets_matching_field() {
        let mut sub = Submission::new();
        sub.record(IntakeStep::AwaitingName, "Анна".into());
        sub.record(IntakeStep::AwaitingAgeGroup, "7–9 лет".into());
        assert_eq!(sub.parent_name.as_deref(), Some("Анна"));
        assert_eq!(sub.age_group.as_deref(), Some("7–9 лет"));
        assert!(sub.branch.is_none());
    }

    #[test]
    fn record_phone_step_marks_typed() {
        let mut sub = Submission::new();
        sub.record(IntakeStep::AwaitingPhone, "+79990000000".into());
        assert_eq!(sub.phone.as_deref(), Some("+79990000000"));
        assert_eq!(sub.phone_source, Some(PhoneSource::Typed));
    }

    #[test]
    fn record_done_is_noop() {
        let mut sub = Submission::new();
        let before = sub.clone();
        sub.record(IntakeStep::Done, "ignored".into());
        assert_eq!(sub, before);
    }

    #[test]
    fn age_group_labels_round_trip() {
        for group in AgeGroup::ALL {
            assert_eq!(AgeGroup::from_label(group.label()), Some(group));
        }
        assert_eq!(AgeGroup::from_label("4-6 лет"), None, "hyphen is not the en dash");
    }

    #[test]
    fn time_slots_depend_on_age_group() {
        assert_eq!(time_slots_for(Some("4–6 лет")).len(), 3);
        assert_eq!(time_slots_for(Some("7–9 лет")).len(), 4);
        assert_eq!(time_slots_for(Some("10+ лет")).len(), 5);
        assert!(time_slots_for(Some("7–9 лет")).contains(&"Суббота 11:45"));
    }

    #[test]
    fn unknown_age_group_falls_back() {
        assert_eq!(time_slots_for(Some("пять лет")), DEFAULT_TIME_SLOTS);
        assert_eq!(time_slots_for(None), DEFAULT_TIME_SLOTS);
    }

    #[test]
    fn submission_serde_skips_unset_fields() {
        let mut sub = Submission::new();
        sub.record(IntakeStep::AwaitingName, "Анна".into());
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["parent_name"], "Анна");
        assert!(json.get("phone").is_none());

        let parsed: Submission = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sub);
    }
}
