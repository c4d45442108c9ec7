//! Staff notification of completed submissions.

use async_trait::async_trait;
use chrono::SecondsFormat;

use crate::channels::{OutgoingMessage, TelegramApi};
use crate::error::NotifyError;

use super::model::Submission;

/// Delivers a completed [`Submission`] to the workshop staff.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, submission: &Submission) -> Result<(), NotifyError>;
}

/// Escape the characters Telegram's HTML parse mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML summary sent to the staff chat.
pub fn render_summary(submission: &Submission) -> String {
    let field = |value: &Option<String>| escape_html(value.as_deref().unwrap_or(""));
    let created = submission
        .created_at
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    format!(
        "<b>📋 Новая запись в Столяркино</b>\n\n\
         👤 <b>Родитель:</b> {}\n\
         🔁 <b>Был у нас:</b> {}\n\
         📍 <b>Филиал:</b> {}\n\
         🎯 <b>Возраст:</b> {}\n\
         🕒 <b>Время:</b> {}\n\
         🧒 <b>Ребёнок:</b> {}\n\
         📱 <b>Телефон:</b> {}\n\
         ⏱ <b>Создано:</b> {created}",
        field(&submission.parent_name),
        field(&submission.been_before),
        field(&submission.branch),
        field(&submission.age_group),
        field(&submission.time_slot),
        field(&submission.child_info),
        field(&submission.phone),
    )
}

/// Posts the summary to a Telegram chat.
pub struct TelegramNotifier {
    api: TelegramApi,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api: TelegramApi, chat_id: impl Into<String>) -> Self {
        Self {
            api,
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, submission: &Submission) -> Result<(), NotifyError> {
        let message = OutgoingMessage::text(render_summary(submission)).html();
        self.api
            .send_message(&self.chat_id, &message)
            .await
            .map_err(|e| NotifyError::DeliveryFailed {
                submission_id: submission.id,
                reason: e.to_string(),
            })?;
        tracing::info!(
            submission_id = %submission.id,
            chat_id = %self.chat_id,
            "Submission forwarded to staff chat"
        );
        Ok(())
    }
}

/// Writes submissions to the log. Used when there is no staff chat to post to.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, submission: &Submission) -> Result<(), NotifyError> {
        let record = serde_json::to_string(submission).unwrap_or_default();
        tracing::info!(
            submission_id = %submission.id,
            submission = %record,
            "New submission"
        );
        Ok(())
    }
}
