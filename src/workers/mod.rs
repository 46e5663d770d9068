//! Queue consumers and the cron-style scheduler loop

mod event_worker;
mod notification_worker;
mod routing_worker;
mod scheduler;
mod sync_worker;

pub use event_worker::EventWorker;
pub use notification_worker::NotificationWorker;
pub use routing_worker::RoutingWorker;
pub use scheduler::{DecayJob, DecayOutcome, DigestJob, ScheduledWorker, Scheduler};
pub use sync_worker::SyncWorker;
