// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engagement executor: walk a pacing plan against a fetched feed

use super::paced_sleep;
use crate::adapters::{FeedItem, SocialClient};
use crate::error::JobError;
use crate::logsink::JobLogger;
use crate::plan::{ActionType, EngagementPlan, PlannedAction};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Which feed to walk when none is supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSelection {
    Timeline,
    Hot,
}

/// Executor switches
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Log the intended action but skip the upstream mutation
    pub dry_run: bool,
    pub stop_on_error: bool,
    pub feed: FeedSelection,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            stop_on_error: false,
            feed: FeedSelection::Timeline,
        }
    }
}

/// One row of the engagement report, in plan order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementOutcome {
    pub success: bool,
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementReport {
    pub results: Vec<EngagementOutcome>,
    pub success_count: usize,
    pub error_count: usize,
    pub like_count: usize,
    pub repost_count: usize,
    pub dry_run: bool,
}

/// Walk the plan, one action per step, with human-paced waits.
///
/// When no feed is supplied, fetches `max(50, 2N)` posts up front. The
/// cursor advances by each action's skip, clamping at the end of the feed.
/// Action failures are recorded per step; with `stop_on_error` set, the
/// first failure aborts the run and fails the whole job.
pub async fn run_engagement<C: SocialClient>(
    client: &C,
    plan: &mut EngagementPlan,
    feed: Option<Vec<FeedItem>>,
    config: &EngagementConfig,
    log: &JobLogger,
    cancel: &CancellationToken,
    mut on_step: impl FnMut(&PlannedAction, usize),
) -> Result<EngagementReport, JobError> {
    let n = plan.len();
    let feed = match feed {
        Some(feed) => feed,
        None => {
            let limit = (2 * n).max(50);
            let fetched = match config.feed {
                FeedSelection::Timeline => client.get_timeline(limit).await?,
                FeedSelection::Hot => client.get_hot_feed(limit).await?,
            };
            log.info(format!("fetched {} feed posts", fetched.len()));
            fetched
        }
    };
    if feed.is_empty() && n > 0 {
        return Err(JobError::Upstream("feed is empty".to_string()));
    }

    let mut results = Vec::with_capacity(n);
    let mut cursor: usize = 0;

    for i in 0..n {
        let delay_s = plan.actions[i].delay_s;
        let skip = plan.actions[i].skip as usize;
        let action = plan.actions[i].action;

        paced_sleep(delay_s, cancel).await?;

        cursor += skip;
        if cursor >= feed.len() {
            log.warn(format!(
                "cursor {} beyond feed of {}, clamping to last post",
                cursor,
                feed.len()
            ));
            cursor = feed.len() - 1;
        }

        let Some(post) = feed[cursor].post.as_ref() else {
            log.warn(format!("feed item {} has no post reference", cursor));
            results.push(EngagementOutcome {
                success: false,
                action,
                post_uri: None,
                post_cid: None,
                error: Some("malformed feed item".to_string()),
            });
            on_step(&plan.actions[i], i);
            continue;
        };

        let verb = match action {
            ActionType::Like => "like",
            ActionType::Repost => "repost",
        };

        let step = if config.dry_run {
            log.info(format!(
                "[dry run] would {} post by @{}: {}",
                verb,
                post.author_handle,
                truncate(&post.text(), 80)
            ));
            Ok(())
        } else {
            match action {
                ActionType::Like => client.like(&post.uri, &post.cid).await,
                ActionType::Repost => client.repost(&post.uri, &post.cid).await,
            }
        };

        match step {
            Ok(()) => {
                results.push(EngagementOutcome {
                    success: true,
                    action,
                    post_uri: Some(post.uri.clone()),
                    post_cid: Some(post.cid.clone()),
                    error: None,
                });
                cursor += 1;
                plan.actions[i].executed = true;
            }
            Err(e) => {
                log.error(format!("{} failed on {}: {}", verb, post.uri, e));
                results.push(EngagementOutcome {
                    success: false,
                    action,
                    post_uri: Some(post.uri.clone()),
                    post_cid: Some(post.cid.clone()),
                    error: Some(e.to_string()),
                });
                if config.stop_on_error {
                    on_step(&plan.actions[i], i);
                    log.error(format!(
                        "aborting engagement after {} of {} actions",
                        i + 1,
                        n
                    ));
                    return Err(e.into());
                }
            }
        }

        on_step(&plan.actions[i], i);
    }

    let success_count = results.iter().filter(|r| r.success).count();
    let like_count = results
        .iter()
        .filter(|r| r.success && r.action == ActionType::Like)
        .count();
    let repost_count = results
        .iter()
        .filter(|r| r.success && r.action == ActionType::Repost)
        .count();

    Ok(EngagementReport {
        error_count: results.len() - success_count,
        success_count,
        like_count,
        repost_count,
        dry_run: config.dry_run,
        results,
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
#[path = "engage_tests.rs"]
mod tests;
