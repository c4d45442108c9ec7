//! Dispatcher: pumps a channel's message stream through the engine.
//!
//! Each inbound message runs on its own task. Tasks of the same user are
//! chained so their replies go out in arrival order; different users never
//! wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::channels::{Channel, Command, InboundEvent, IncomingMessage, OutgoingMessage};
use crate::error;
use crate::intake::{ConversationEngine, Notifier, spawn_eviction_task};

#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn Channel>,
    engine: Arc<ConversationEngine>,
    notifier: Arc<dyn Notifier>,
    session_ttl: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        channel: Arc<dyn Channel>,
        engine: Arc<ConversationEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            channel,
            engine,
            notifier,
            session_ttl: None,
        }
    }

    /// Evict sessions idle longer than `ttl` while running. `None` keeps them forever.
    pub fn with_session_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Run until the channel stream ends or Ctrl+C.
    pub async fn run(self) -> error::Result<()> {
        let mut message_stream = self.channel.start().await?;

        let eviction_handle = self
            .session_ttl
            .map(|ttl| spawn_eviction_task(Arc::clone(&self.engine), ttl));

        let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();

        tracing::info!(channel = self.channel.name(), "Intake bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            in_flight.retain(|_, handle| !handle.is_finished());

            let previous = in_flight.remove(&message.user_id);
            let user_id = message.user_id.clone();
            let dispatcher = self.clone();
            let handle = tokio::spawn(async move {
                if let Some(previous) = previous {
                    let _ = previous.await;
                }
                dispatcher.handle_message(&message).await;
            });
            in_flight.insert(user_id, handle);
        }

        futures::future::join_all(in_flight.into_values()).await;

        if let Some(handle) = eviction_handle {
            handle.abort();
        }
        self.channel.shutdown().await?;

        Ok(())
    }

    /// Handle one message: answer `/id`, otherwise advance the user's form,
    /// send the replies and forward a completed submission.
    ///
    /// Send and notify failures are logged; they never touch session state.
    pub async fn handle_message(&self, message: &IncomingMessage) {
        tracing::debug!(
            user_id = %message.user_id,
            user_name = message.user_name.as_deref().unwrap_or(""),
            channel = %message.channel,
            "Inbound message"
        );

        if let InboundEvent::Command {
            command: Command::Id,
        } = &message.event
        {
            let reply = OutgoingMessage::text(format!("Ваш chat_id: {}", message.chat_id));
            self.reply(message, reply).await;
            return;
        }

        let transition = match self.engine.handle(&message.user_id, &message.event).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(user_id = %message.user_id, "Error handling message: {e}");
                return;
            }
        };

        for reply in transition.replies {
            self.reply(message, reply).await;
        }

        if let Some(submission) = transition.submission {
            if let Err(e) = self.notifier.notify(&submission).await {
                tracing::warn!(
                    submission_id = %submission.id,
                    "Failed to notify staff: {e}"
                );
            }
        }
    }

    async fn reply(&self, message: &IncomingMessage, reply: OutgoingMessage) {
        if let Err(e) = self.channel.send(&message.chat_id, reply).await {
            tracing::warn!(
                user_id = %message.user_id,
                channel = %message.channel,
                "Failed to send reply: {e}"
            );
        }
    }
}
