// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct-message dispatch
//!
//! Messages cycle over recipients: recipient `i` gets message `i % len`.
//! Each send starts (or reuses) a conversation first. Progress advances
//! one step per recipient; per-recipient failures are recorded without
//! failing the job unless every send failed.

use crate::adapters::SocialClient;
use crate::error::JobError;
use crate::logsink::JobLogger;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One row of the chat report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub recipient: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReport {
    pub results: Vec<ChatOutcome>,
    pub sent: usize,
    pub failed: usize,
}

pub async fn run_chat<C: SocialClient>(
    client: &C,
    messages: &[String],
    recipients: &[String],
    log: &JobLogger,
    cancel: &CancellationToken,
    mut on_step: impl FnMut(usize),
) -> Result<ChatReport, JobError> {
    if messages.is_empty() {
        return Err(JobError::BadRequest("no messages to send".to_string()));
    }

    let mut results = Vec::with_capacity(recipients.len());

    for (i, recipient) in recipients.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let message = &messages[i % messages.len()];
        let outcome = match client.start_conversation(recipient).await {
            Ok(convo_id) => match client.send_dm(&convo_id, message).await {
                Ok(()) => {
                    log.info(format!("sent dm to @{}", recipient));
                    ChatOutcome {
                        recipient: recipient.clone(),
                        success: true,
                        convo_id: Some(convo_id),
                        error: None,
                    }
                }
                Err(e) => {
                    log.error(format!("dm to @{} failed: {}", recipient, e));
                    ChatOutcome {
                        recipient: recipient.clone(),
                        success: false,
                        convo_id: Some(convo_id),
                        error: Some(e.to_string()),
                    }
                }
            },
            Err(e) => {
                log.error(format!("could not open conversation with @{}: {}", recipient, e));
                ChatOutcome {
                    recipient: recipient.clone(),
                    success: false,
                    convo_id: None,
                    error: Some(e.to_string()),
                }
            }
        };

        results.push(outcome);
        on_step(i);
    }

    let sent = results.iter().filter(|r| r.success).count();
    if sent == 0 && !results.is_empty() {
        log.error(format!("all {} dm sends failed", results.len()));
        return Err(JobError::Upstream(format!(
            "all {} dm sends failed",
            results.len()
        )));
    }

    Ok(ChatReport {
        failed: results.len() - sent,
        sent,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::FakeSocialClient;
    use crate::events::EventBus;

    fn logger() -> JobLogger {
        JobLogger::new(EventBus::new(), "t1", "j1", None)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn messages_cycle_over_recipients() {
        let client = FakeSocialClient::new();
        let report = run_chat(
            &client,
            &strings(&["hello", "hola"]),
            &strings(&["ana.social", "bo.social", "cy.social"]),
            &logger(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.sent, 3);
        assert_eq!(report.failed, 0);

        let dms = client.dms();
        assert_eq!(dms[0], ("convo-ana.social".to_string(), "hello".to_string()));
        assert_eq!(dms[1], ("convo-bo.social".to_string(), "hola".to_string()));
        assert_eq!(dms[2], ("convo-cy.social".to_string(), "hello".to_string()));
    }

    #[tokio::test]
    async fn single_message_repeats_for_everyone() {
        let client = FakeSocialClient::new();
        let report = run_chat(
            &client,
            &strings(&["ping"]),
            &strings(&["a.social", "b.social"]),
            &logger(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.sent, 2);
        assert!(client.dms().iter().all(|(_, text)| text == "ping"));
    }

    #[tokio::test]
    async fn failures_are_per_recipient() {
        let client = FakeSocialClient::new().with_dm_reject("b.social", "blocked");
        let report = run_chat(
            &client,
            &strings(&["hi"]),
            &strings(&["a.social", "b.social", "c.social"]),
            &logger(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
        assert!(report.results[0].success);
        assert_eq!(report.results[1].error.as_deref(), Some("upstream error: blocked"));
        assert!(report.results[2].success);
    }

    #[tokio::test]
    async fn every_send_failing_fails_the_job() {
        let client = FakeSocialClient::new().with_engagement_err("blocked");
        let err = run_chat(
            &client,
            &strings(&["hi"]),
            &strings(&["a.social", "b.social"]),
            &logger(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::Upstream(_)));
        assert!(err.is_retriable());
        assert!(err.to_string().contains("all 2 dm sends failed"));
    }

    #[tokio::test]
    async fn progress_steps_once_per_recipient() {
        let client = FakeSocialClient::new();
        let mut steps = Vec::new();
        run_chat(
            &client,
            &strings(&["hi"]),
            &strings(&["a.social", "b.social", "c.social"]),
            &logger(),
            &CancellationToken::new(),
            |i| steps.push(i),
        )
        .await
        .unwrap();

        assert_eq!(steps, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let client = FakeSocialClient::new();
        let err = run_chat(
            &client,
            &[],
            &strings(&["a.social"]),
            &logger(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancellation_checks_before_each_send() {
        let client = FakeSocialClient::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_chat(
            &client,
            &strings(&["hi"]),
            &strings(&["a.social"]),
            &logger(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, JobError::Cancelled));
        assert!(client.dms().is_empty());
    }
}
