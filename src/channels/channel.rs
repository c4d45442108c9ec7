//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// Slash commands the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Cancel,
    /// Reply with the caller's chat id.
    Id,
    Other(String),
}

impl Command {
    /// Parse a slash command, dropping arguments and any `@botname` suffix.
    ///
    /// Returns `None` when `text` is not a command at all.
    pub fn parse(text: &str) -> Option<Self> {
        Self::parse_for(text, None)
    }

    /// Like [`Command::parse`], but when `bot_username` is known a command
    /// addressed to a different bot (`/start@OtherBot`) comes back as
    /// [`Command::Other`] so it never drives this bot's form.
    pub fn parse_for(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let rest = text.trim().strip_prefix('/')?;
        let word = rest.split_whitespace().next().unwrap_or("");
        let (name, addressee) = match word.split_once('@') {
            Some((name, addressee)) => (name, Some(addressee)),
            None => (word, None),
        };
        if name.is_empty() {
            return None;
        }
        if let (Some(addressee), Some(me)) = (addressee, bot_username) {
            if !addressee.eq_ignore_ascii_case(me.trim_start_matches('@')) {
                return Some(Self::Other(word.to_string()));
            }
        }
        Some(match name {
            "start" => Self::Start,
            "cancel" => Self::Cancel,
            "id" => Self::Id,
            other => Self::Other(other.to_string()),
        })
    }
}

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command { command: Command },
    Text { content: String },
    /// A shared contact card.
    Contact { phone_number: String },
}

impl InboundEvent {
    pub fn command(command: Command) -> Self {
        Self::Command { command }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn contact(phone_number: impl Into<String>) -> Self {
        Self::Contact {
            phone_number: phone_number.into(),
        }
    }

    /// Classify raw message text: slash commands become `Command`, the rest `Text`.
    pub fn from_text(text: &str) -> Self {
        Self::from_text_for(text, None)
    }

    /// [`InboundEvent::from_text`] for a bot that knows its own username.
    pub fn from_text_for(text: &str, bot_username: Option<&str>) -> Self {
        match Command::parse_for(text, bot_username) {
            Some(command) => Self::command(command),
            None => Self::text(text),
        }
    }
}

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Name of the channel that produced it.
    pub channel: String,
    /// Stable per-user identifier; sessions are keyed by it.
    pub user_id: String,
    /// Where replies go.
    pub chat_id: String,
    pub user_name: Option<String>,
    pub event: InboundEvent,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        chat_id: impl Into<String>,
        event: InboundEvent,
    ) -> Self {
        Self {
            channel: channel.into(),
            user_id: user_id.into(),
            chat_id: chat_id.into(),
            user_name: None,
            event,
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }
}

/// One quick-reply button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    /// Pressing it shares the user's phone number instead of sending text.
    pub request_contact: bool,
}

impl Button {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            request_contact: false,
        }
    }

    pub fn contact(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            request_contact: true,
        }
    }
}

/// Quick-reply keyboard, row by row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }

    /// Labels of every button, row by row.
    pub fn labels(&self) -> Vec<Vec<&str>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|b| b.label.as_str()).collect())
            .collect()
    }
}

/// What to do with the user's keyboard alongside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMarkup {
    Keyboard(Keyboard),
    Remove,
}

/// Text formatting the transport should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    /// `None` leaves the user's current keyboard untouched.
    pub markup: Option<ReplyMarkup>,
    pub parse_mode: Option<ParseMode>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: None,
            parse_mode: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.markup = Some(ReplyMarkup::Keyboard(keyboard));
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.markup = Some(ReplyMarkup::Remove);
        self
    }

    pub fn html(mut self) -> Self {
        self.parse_mode = Some(ParseMode::Html);
        self
    }

    /// The keyboard attached to this message, if any.
    pub fn keyboard(&self) -> Option<&Keyboard> {
        match &self.markup {
            Some(ReplyMarkup::Keyboard(k)) => Some(k),
            _ => None,
        }
    }
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the channel stops.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Deliver a message to a chat.
    async fn send(&self, chat_id: &str, message: OutgoingMessage) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
