//! Intake conversation: the step machine, session storage and staff
//! notification for workshop sign-ups.
//!
//! Channels hand inbound events to [`ConversationEngine::handle`], which
//! returns the replies to send and, on the last step, the completed
//! [`Submission`] for a [`Notifier`].

pub mod answer;
pub mod engine;
pub mod model;
pub mod notifier;
pub mod prompts;
pub mod session;
pub mod state;

pub use answer::{Answer, BACK_LABEL, Choice};
pub use engine::{ConversationEngine, Transition, spawn_eviction_task};
pub use model::{AgeGroup, Branch, PhoneSource, PriorVisit, Submission};
pub use notifier::{LogNotifier, Notifier, TelegramNotifier, render_summary};
pub use session::{InMemorySessionStore, Session, SessionEntry, SessionStore, UserLocks};
pub use state::IntakeStep;
