//! Outbound transports: Slack chat messages and the Moco finance API.

mod moco;
mod notification;
mod retry;
mod slack;

pub use moco::MocoClient;
pub use notification::Notification;
pub use retry::{backoff_delay, with_retries};
pub use slack::SlackNotifier;
