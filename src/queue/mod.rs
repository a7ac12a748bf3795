// ============================================================================
// Work Queue
// ============================================================================
//
// Background work triggered by domain events (payment step, notification
// emails) travels as `QueueMessage`s on a Redpanda topic and is consumed in
// batches with per-message failure isolation.
//
// ============================================================================

pub mod dispatcher;
pub mod mailer;
pub mod message;
pub mod producer;
pub mod runner;
pub mod worker;

pub use dispatcher::{Dispatcher, HandlerError, MessageHandler};
pub use mailer::{LogMailer, MailError, Mailer};
pub use message::{EmailMessage, QueueMessage, PROCESS_ORDER, SEND_EMAIL};
pub use producer::{KafkaQueue, MessageQueue, QueueError};
pub use runner::{route_failure, FailureRoute, QueueRunner};
pub use worker::{BatchReport, BatchWorker, FailedMessage};
