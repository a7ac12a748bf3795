use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::dispatcher::Dispatcher;
use super::message::QueueMessage;
use crate::utils::IsTransient;

// ============================================================================
// Batch Worker
// ============================================================================
//
// Each message of a batch runs in its own task. A handler error or panic is
// recorded against that message only; siblings keep running and the batch
// always completes with a report naming exactly the messages to redeliver.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedMessage {
    pub message_id: String,
    pub reason: String,
    /// False when redelivery cannot help (bad payload, missing order)
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub processed: Vec<String>,
    pub failed: Vec<FailedMessage>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchWorker {
    dispatcher: Arc<Dispatcher>,
}

impl BatchWorker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn process(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();

        for (index, message) in messages.into_iter().enumerate() {
            let dispatcher = self.dispatcher.clone();
            let message_id = message.message_id.clone();
            let span = tracing::info_span!(
                "queue_message",
                message_id = %message.message_id,
                message_type = %message.message_type,
                correlation_id = %message.correlation(),
                delivery_attempt = message.delivery_attempt,
            );

            let handle = tasks.spawn(
                async move {
                    dispatcher
                        .dispatch(&message)
                        .await
                        .map_err(|e| (e.to_string(), e.is_transient()))
                }
                .instrument(span),
            );
            in_flight.insert(handle.id(), (index, message_id));
        }

        let mut outcomes = Vec::with_capacity(in_flight.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(join_error) => (
                    join_error.id(),
                    Err((format!("handler panicked: {}", join_error), true)),
                ),
            };

            match in_flight.remove(&task_id) {
                Some((index, message_id)) => outcomes.push((index, message_id, result)),
                None => tracing::error!(task_id = %task_id, "Batch task finished with unknown id"),
            }
        }

        // Report in batch order
        outcomes.sort_by_key(|(index, _, _)| *index);

        let mut report = BatchReport::default();
        for (_, message_id, result) in outcomes {
            match result {
                Ok(()) => report.processed.push(message_id),
                Err((reason, retryable)) => {
                    tracing::warn!(
                        message_id = %message_id,
                        reason = %reason,
                        retryable = retryable,
                        "❌ Queue message failed"
                    );
                    report.failed.push(FailedMessage {
                        message_id,
                        reason,
                        retryable,
                    });
                }
            }
        }

        tracing::info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Batch complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::queue::dispatcher::{HandlerError, MessageHandler};
    use crate::validation::{ValidationFailure, Violation, ViolationCode};
    use async_trait::async_trait;
    use serde_json::json;

    /// Fails messages whose data says so; panics on request
    struct ScriptedHandler;

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(&self, message: &QueueMessage) -> Result<(), HandlerError> {
            if message.data["panic"] == json!(true) {
                panic!("scripted panic");
            }
            if message.data["fail"] == json!(true) {
                return Err(HandlerError::InvalidPayload(ValidationFailure::single(
                    Violation::new("fail", ViolationCode::InvalidType, "scripted failure"),
                )));
            }
            Ok(())
        }
    }

    fn worker() -> BatchWorker {
        let dispatcher = Dispatcher::new(Arc::new(Metrics::new().unwrap()))
            .register("SCRIPTED", Arc::new(ScriptedHandler));
        BatchWorker::new(Arc::new(dispatcher))
    }

    fn batch(data: Vec<serde_json::Value>) -> Vec<QueueMessage> {
        data.into_iter()
            .enumerate()
            .map(|(i, d)| {
                let mut m = QueueMessage::new("SCRIPTED", d);
                m.message_id = format!("m{}", i + 1);
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let messages = batch(vec![
            json!({}),
            json!({}),
            json!({ "fail": true }),
            json!({}),
            json!({}),
        ]);

        let report = worker().process(messages).await;

        assert_eq!(report.processed, vec!["m1", "m2", "m4", "m5"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].message_id, "m3");
        assert!(!report.failed[0].retryable);
    }

    #[tokio::test]
    async fn test_panic_is_captured_per_message() {
        let messages = batch(vec![json!({}), json!({ "panic": true }), json!({})]);

        let report = worker().process(messages).await;

        assert_eq!(report.processed, vec!["m1", "m3"]);
        assert_eq!(report.failed[0].message_id, "m2");
        assert!(report.failed[0].reason.contains("panicked"));
        assert!(report.failed[0].retryable);
    }

    #[tokio::test]
    async fn test_unknown_types_count_as_processed() {
        let mut messages = batch(vec![json!({})]);
        messages[0].message_type = "SOMETHING_NEW".into();

        let report = worker().process(messages).await;

        assert!(report.is_clean());
        assert_eq!(report.processed, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_empty_batch_reports_nothing() {
        let report = worker().process(Vec::new()).await;
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn test_report_wire_shape() {
        let report = BatchReport {
            processed: vec!["m1".into()],
            failed: vec![FailedMessage {
                message_id: "m2".into(),
                reason: "boom".into(),
                retryable: true,
            }],
        };

        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "processed": ["m1"],
                "failed": [{ "messageId": "m2", "reason": "boom", "retryable": true }]
            })
        );
    }
}
