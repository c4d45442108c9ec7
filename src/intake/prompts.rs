//! Prompt texts and keyboards for each intake step.

use crate::channels::{Button, Keyboard, OutgoingMessage};

use super::answer::BACK_LABEL;
use super::model::{AgeGroup, Branch, PriorVisit, Submission, time_slots_for};
use super::state::IntakeStep;

pub const WELCOME: &str = "Вас приветствует СТОЛЯРКОБОТ👋\n\n\
    В Столяркино ваш ребенок научится мастерить из дерева, работать на станках и с инструментами, \
    станет настоящим хозяином в доме ⚒️\n\n\
    Я помогу вам записаться в нашу мастерскую и занять место в группе.\n\
    Тем более расписание на новый учебный год уже готово 🤗";

pub const ASK_NAME: &str = "Как к вам обращаться? Напишите, пожалуйста, ваше имя ✍️";

pub const ASK_PRIOR_VISIT: &str = "Приятно познакомиться 😊\n\nСкажите, вы уже были у нас?";

pub const ASK_BRANCH: &str = "Понял вас 😇\n\nВыберите филиал, в который вам удобнее ходить:";

pub const ASK_AGE_GROUP: &str =
    "Отлично 😊\n\nТеперь определимся с возрастной группой вашего ребенка";

pub const ASK_TIME_SLOT: &str = "Выберите удобное время для посещения Столяркино 👇";

pub const ASK_CHILD_INFO: &str = "Осталось пара шагов — напишите ФИ ребенка и дату рождения\n\n\
    Например: Иванов Иван, 14.02.2017";

pub const ASK_PHONE: &str = "И ваш контактный номер телефона ✍️\n\n\
    Можно отправить текстом или нажмите кнопку «Отправить телефон».";

pub const SHARE_PHONE_LABEL: &str = "Отправить телефон";

pub const CANCELLED: &str = "Диалог отменён. Чтобы начать заново — отправьте /start";

/// Final message to the user, echoing the chosen time.
pub fn confirmation(time_slot: &str) -> String {
    format!(
        "Ура! Я вас записал 😍\n\n\
         Вы выбрали время: {time_slot}\n\n\
         Наш администратор с вами свяжется для подтверждения записи после нашего отпуска.\n\n\
         А пока обязательно подпишитесь на наш телеграм-канал:\n\
         СТОЛЯРКИНО — https://t.me/stolyarkaizh\n\
         Там будут все актуальные новости о жизни нашей мастерской 🤗"
    )
}

/// Messages that open a fresh conversation.
pub fn opening() -> Vec<OutgoingMessage> {
    vec![OutgoingMessage::text(WELCOME), prompt(IntakeStep::AwaitingName, &Submission::new())]
}

/// The prompt for `step`, with its keyboard.
///
/// The time-slot keyboard depends on the age group already in `submission`.
pub fn prompt(step: IntakeStep, submission: &Submission) -> OutgoingMessage {
    match step {
        IntakeStep::AwaitingName => OutgoingMessage::text(ASK_NAME).remove_keyboard(),
        IntakeStep::AwaitingPriorVisit => OutgoingMessage::text(ASK_PRIOR_VISIT).with_keyboard(
            with_back(vec![PriorVisit::ALL.iter().map(|v| Button::text(v.label())).collect()]),
        ),
        IntakeStep::AwaitingBranch => OutgoingMessage::text(ASK_BRANCH).with_keyboard(with_back(
            vec![Branch::ALL.iter().map(|b| Button::text(b.label())).collect()],
        )),
        IntakeStep::AwaitingAgeGroup => OutgoingMessage::text(ASK_AGE_GROUP).with_keyboard(
            with_back(vec![AgeGroup::ALL.iter().map(|g| Button::text(g.label())).collect()]),
        ),
        IntakeStep::AwaitingTimeSlot => OutgoingMessage::text(ASK_TIME_SLOT)
            .with_keyboard(time_slot_keyboard(submission.age_group.as_deref())),
        IntakeStep::AwaitingChildInfo => {
            OutgoingMessage::text(ASK_CHILD_INFO).with_keyboard(with_back(Vec::new()))
        }
        IntakeStep::AwaitingPhone => OutgoingMessage::text(ASK_PHONE).with_keyboard(with_back(
            vec![vec![Button::contact(SHARE_PHONE_LABEL)]],
        )),
        IntakeStep::Done => {
            OutgoingMessage::text(confirmation(submission.time_slot.as_deref().unwrap_or("")))
                .remove_keyboard()
        }
    }
}

/// Time-slot keyboard for an age-group answer: two per row when there are
/// more than four slots, otherwise three, then the back row.
pub fn time_slot_keyboard(age_group: Option<&str>) -> Keyboard {
    let slots = time_slots_for(age_group);
    let per_row = if slots.len() > 4 { 2 } else { 3 };
    with_back(chunk_rows(slots, per_row))
}

/// Lay out labels in rows of `per_row`.
pub fn chunk_rows(labels: &[&str], per_row: usize) -> Vec<Vec<Button>> {
    labels
        .chunks(per_row.max(1))
        .map(|row| row.iter().map(|label| Button::text(*label)).collect())
        .collect()
}

fn with_back(mut rows: Vec<Vec<Button>>) -> Keyboard {
    rows.push(vec![Button::text(BACK_LABEL)]);
    Keyboard::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ReplyMarkup;

    #[test]
    fn ten_plus_slots_come_in_pairs() {
        let kb = time_slot_keyboard(Some("10+ лет"));
        assert_eq!(
            kb.labels(),
            vec![
                vec!["Понедельник 18:00", "Среда 18:00"],
                vec!["Пятница 18:00", "Суббота 13:30"],
                vec!["Воскресенье 13:30"],
                vec![BACK_LABEL],
            ]
        );
    }

    #[test]
    fn four_to_six_slots_come_in_threes() {
        let kb = time_slot_keyboard(Some("4–6 лет"));
        assert_eq!(
            kb.labels(),
            vec![
                vec!["Четверг 17:30", "Суббота 10:00", "Воскресенье 10:00"],
                vec![BACK_LABEL],
            ]
        );
    }

    #[test]
    fn four_slots_still_use_rows_of_three() {
        let kb = time_slot_keyboard(Some("7–9 лет"));
        assert_eq!(
            kb.labels(),
            vec![
                vec!["Вторник 17:30", "Четверг 17:30", "Суббота 11:45"],
                vec!["Воскресенье 11:45"],
                vec![BACK_LABEL],
            ]
        );
    }

    #[test]
    fn time_slot_keyboard_is_pure() {
        assert_eq!(
            time_slot_keyboard(Some("10+ лет")),
            time_slot_keyboard(Some("10+ лет"))
        );
    }

    #[test]
    fn chunk_rows_handles_zero_width() {
        assert_eq!(chunk_rows(&["a", "b"], 0).len(), 2);
        assert!(chunk_rows(&[], 3).is_empty());
    }

    #[test]
    fn name_prompt_clears_keyboard() {
        let msg = prompt(IntakeStep::AwaitingName, &Submission::new());
        assert_eq!(msg.text, ASK_NAME);
        assert_eq!(msg.markup, Some(ReplyMarkup::Remove));
    }

    #[test]
    fn every_later_step_offers_back() {
        let sub = Submission::new();
        for step in IntakeStep::ALL {
            if !step.accepts_back() {
                continue;
            }
            let msg = prompt(step, &sub);
            let kb = msg.keyboard().expect("keyboard");
            assert_eq!(kb.labels().last().unwrap(), &vec![BACK_LABEL], "{step}");
        }
    }

    #[test]
    fn phone_prompt_requests_contact() {
        let msg = prompt(IntakeStep::AwaitingPhone, &Submission::new());
        let kb = msg.keyboard().unwrap();
        assert!(kb.rows[0][0].request_contact);
        assert_eq!(kb.rows[0][0].label, SHARE_PHONE_LABEL);
    }

    #[test]
    fn time_slot_prompt_follows_stored_age_group() {
        let mut sub = Submission::new();
        sub.age_group = Some("10+ лет".into());
        let msg = prompt(IntakeStep::AwaitingTimeSlot, &sub);
        assert_eq!(msg.keyboard(), Some(&time_slot_keyboard(Some("10+ лет"))));
    }

    #[test]
    fn confirmation_echoes_time() {
        assert!(confirmation("Суббота 11:45").contains("Вы выбрали время: Суббота 11:45"));
    }

    #[test]
    fn opening_is_welcome_then_name() {
        let msgs = opening();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, WELCOME);
        assert_eq!(msgs[1].text, ASK_NAME);
    }
}
