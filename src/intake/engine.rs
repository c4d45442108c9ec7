//! ConversationEngine: applies one inbound event to a user's session.

use std::sync::Arc;
use std::time::Duration;

use crate::channels::{Command, InboundEvent, OutgoingMessage};
use crate::error::StoreError;

use super::answer::Answer;
use super::model::{PhoneSource, Submission};
use super::prompts;
use super::session::{Session, SessionEntry, SessionStore, UserLocks};
use super::state::IntakeStep;

/// Outcome of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Where the user is now. `None` when no session remains.
    pub step: Option<IntakeStep>,
    /// Messages to send back to the user, in order.
    pub replies: Vec<OutgoingMessage>,
    /// Set exactly once, when the form is completed.
    pub submission: Option<Submission>,
}

impl Transition {
    fn at(step: IntakeStep, replies: Vec<OutgoingMessage>) -> Self {
        Self {
            step: Some(step),
            replies,
            submission: None,
        }
    }

    fn unchanged(step: Option<IntakeStep>) -> Self {
        Self {
            step,
            replies: Vec::new(),
            submission: None,
        }
    }
}

/// Per-user intake state machine over an injected [`SessionStore`].
pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    locks: UserLocks,
}

impl ConversationEngine {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
        }
    }

    /// Apply `event` from `user_id`.
    ///
    /// Events of the same user are serialized; different users run in parallel.
    pub async fn handle(
        &self,
        user_id: &str,
        event: &InboundEvent,
    ) -> Result<Transition, StoreError> {
        let _guard = self.locks.lock(user_id).await;

        match event {
            InboundEvent::Command { command } => match command {
                Command::Start => self.start(user_id).await,
                Command::Cancel => self.cancel(user_id).await,
                Command::Id | Command::Other(_) => {
                    let step = self.store.get(user_id).await?.map(|s| s.step);
                    Ok(Transition::unchanged(step))
                }
            },
            InboundEvent::Text { content } => self.text(user_id, content).await,
            InboundEvent::Contact { phone_number } => self.contact(user_id, phone_number).await,
        }
    }

    /// Drop sessions idle longer than `max_idle` and their unused locks.
    pub async fn evict_idle(&self, max_idle: Duration) -> Result<usize, StoreError> {
        let evicted = self.store.evict_idle(max_idle).await?;
        let pruned = self.locks.prune();
        if evicted > 0 {
            tracing::info!(evicted, pruned_locks = pruned, "Evicted idle sessions");
        }
        Ok(evicted)
    }

    async fn start(&self, user_id: &str) -> Result<Transition, StoreError> {
        let session = Session::new();
        tracing::info!(
            user_id,
            submission_id = %session.submission.id,
            "Intake started"
        );
        self.store.put(user_id, session).await?;
        Ok(Transition::at(IntakeStep::AwaitingName, prompts::opening()))
    }

    async fn cancel(&self, user_id: &str) -> Result<Transition, StoreError> {
        let existed = self.store.delete(user_id).await?;
        tracing::info!(user_id, had_session = existed, "Intake cancelled");
        Ok(Transition {
            step: None,
            replies: vec![OutgoingMessage::text(prompts::CANCELLED).remove_keyboard()],
            submission: None,
        })
    }

    /// Load the user's session, restarting when there is none.
    ///
    /// `Err` carries the restart transition to return as-is.
    async fn resume(&self, user_id: &str) -> Result<Result<Session, Transition>, StoreError> {
        match self.store.get_or_create(user_id).await? {
            SessionEntry::Existing(session) => Ok(Ok(session)),
            SessionEntry::Created(session) => {
                tracing::info!(
                    user_id,
                    submission_id = %session.submission.id,
                    "No active session; restarting intake"
                );
                Ok(Err(Transition::at(session.step, prompts::opening())))
            }
        }
    }

    async fn text(&self, user_id: &str, content: &str) -> Result<Transition, StoreError> {
        let mut session = match self.resume(user_id).await? {
            Ok(session) => session,
            Err(restart) => return Ok(restart),
        };
        let step = session.step;

        let Some(value) = Answer::decode(step, content).into_value() else {
            // Back token; decode only yields it where a previous step exists.
            let Some(previous) = step.previous() else {
                return Ok(Transition::unchanged(Some(step)));
            };
            session.step = previous;
            session.touch();
            let reply = prompts::prompt(previous, &session.submission);
            self.store.put(user_id, session).await?;
            tracing::debug!(user_id, from = %step, to = %previous, "Stepped back");
            return Ok(Transition::at(previous, vec![reply]));
        };

        if step == IntakeStep::AwaitingPhone {
            session.submission.record_phone(value, PhoneSource::Typed);
            return self.finish(user_id, session).await;
        }

        session.submission.record(step, value);
        self.advance(user_id, session).await
    }

    async fn contact(&self, user_id: &str, phone_number: &str) -> Result<Transition, StoreError> {
        let mut session = match self.resume(user_id).await? {
            Ok(session) => session,
            Err(restart) => return Ok(restart),
        };

        if session.step != IntakeStep::AwaitingPhone {
            tracing::debug!(user_id, step = %session.step, "Ignoring contact outside the phone step");
            return Ok(Transition::unchanged(Some(session.step)));
        }

        session
            .submission
            .record_phone(phone_number.trim().to_string(), PhoneSource::SharedContact);
        self.finish(user_id, session).await
    }

    async fn advance(&self, user_id: &str, mut session: Session) -> Result<Transition, StoreError> {
        let from = session.step;
        let Some(next) = from.next() else {
            return Ok(Transition::unchanged(Some(from)));
        };
        session.step = next;
        session.touch();
        let reply = prompts::prompt(next, &session.submission);
        self.store.put(user_id, session).await?;
        tracing::debug!(user_id, from = %from, to = %next, "Answer recorded");
        Ok(Transition::at(next, vec![reply]))
    }

    async fn finish(&self, user_id: &str, session: Session) -> Result<Transition, StoreError> {
        self.store.delete(user_id).await?;

        let submission = session.submission;
        let reply = prompts::prompt(IntakeStep::Done, &submission);
        tracing::info!(
            user_id,
            submission_id = %submission.id,
            phone_source = ?submission.phone_source,
            "Intake completed"
        );

        Ok(Transition {
            step: Some(IntakeStep::Done),
            replies: vec![reply],
            submission: Some(submission),
        })
    }
}

/// Spawn a background task that evicts idle sessions every 60 seconds.
pub fn spawn_eviction_task(
    engine: Arc<ConversationEngine>,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            if let Err(e) = engine.evict_idle(max_idle).await {
                tracing::warn!("Session eviction failed: {e}");
            }
        }
    })
}
