use super::*;
use crate::adapters::{FakeSocialClient, FeedPost};
use crate::events::EventBus;
use crate::plan::{build_plan, PlanOptions, StrategyKind};
use crate::random::SeededRand;

fn feed_of(n: usize) -> Vec<FeedItem> {
    (0..n)
        .map(|i| {
            FeedItem::of(FeedPost {
                uri: format!("at://feed/post/{}", i),
                cid: format!("cid-{}", i),
                author_handle: format!("author{}.social", i),
                record: serde_json::json!({"text": format!("post number {}", i)}),
            })
        })
        .collect()
}

fn logger() -> JobLogger {
    JobLogger::new(EventBus::new(), "t1", "j1", None)
}

fn uniform_plan(n: usize, seed: u64) -> EngagementPlan {
    let opts = PlanOptions {
        number_of_actions: n,
        ..Default::default()
    };
    build_plan(&opts, StrategyKind::Uniform, &SeededRand::new(seed))
}

#[tokio::test(start_paused = true)]
async fn dry_run_scenario_touches_nothing_upstream() {
    // N=10, seed 42, feed of 100, uniform strategy
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(10, 42);
    assert_eq!(plan.like_count, 7);
    assert_eq!(plan.repost_count, 3);

    let config = EngagementConfig {
        dry_run: true,
        ..Default::default()
    };
    let report = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(100)),
        &config,
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(report.results.len(), 10);
    assert_eq!(report.success_count, 10);
    assert_eq!(report.error_count, 0);
    assert!(report.dry_run);

    // Action types follow the plan
    for (row, action) in report.results.iter().zip(plan.actions.iter()) {
        assert_eq!(row.action, action.action);
        assert!(row.success);
    }

    // No likes or reposts actually performed
    assert!(client.likes().is_empty());
    assert!(client.reposts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn live_run_performs_planned_actions() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(10, 42);

    let report = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(100)),
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(report.success_count, 10);
    assert_eq!(client.likes().len(), 7);
    assert_eq!(client.reposts().len(), 3);
    assert_eq!(report.like_count + report.repost_count, report.success_count);
    assert!(plan.actions.iter().all(|a| a.executed));
}

#[tokio::test(start_paused = true)]
async fn fetches_feed_when_none_supplied() {
    let client = FakeSocialClient::new().with_timeline(feed_of(200));
    let mut plan = uniform_plan(10, 1);

    run_engagement(
        &client,
        &mut plan,
        None,
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    // max(50, 2*10) = 50
    assert_eq!(client.timeline_requests(), vec![50]);
}

#[tokio::test(start_paused = true)]
async fn fetch_sizes_scale_with_plan() {
    let client = FakeSocialClient::new().with_timeline(feed_of(200));
    let mut plan = uniform_plan(40, 1);

    run_engagement(
        &client,
        &mut plan,
        None,
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(client.timeline_requests(), vec![80]);
}

#[tokio::test(start_paused = true)]
async fn cursor_clamps_at_feed_end() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(5, 3);
    let log = logger();

    // Tiny feed forces the cursor past the end
    let report = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(2)),
        &EngagementConfig::default(),
        &log,
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(report.results.len(), 5);
    assert_eq!(report.success_count, 5);
    assert!(log
        .snapshot()
        .iter()
        .any(|line| line.message.contains("clamping")));
}

#[tokio::test(start_paused = true)]
async fn malformed_items_record_failures_without_stopping() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(3, 5);
    // Zero out skips so the cursor stays put on the malformed head
    for action in &mut plan.actions {
        action.skip = 0;
    }

    let mut feed = feed_of(4);
    feed[0] = FeedItem::default();

    let report = run_engagement(
        &client,
        &mut plan,
        Some(feed),
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    // First action hits the malformed item and the cursor does not advance,
    // so every subsequent action sees it too.
    assert_eq!(report.error_count, 3);
    assert_eq!(report.success_count, 0);
    assert!(report
        .results
        .iter()
        .all(|r| r.error.as_deref() == Some("malformed feed item")));
}

#[tokio::test(start_paused = true)]
async fn upstream_errors_continue_unless_stop_on_error() {
    let client = FakeSocialClient::new().with_engagement_err("503 upstream");
    let mut plan = uniform_plan(4, 9);

    let report = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(50)),
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(report.error_count, 4);
    assert_eq!(report.success_count, 0);
    assert_eq!(report.results.len(), plan.len());
}

#[tokio::test(start_paused = true)]
async fn stop_on_error_fails_the_job_on_first_failure() {
    let client = FakeSocialClient::new().with_engagement_err("503 upstream");
    let mut plan = uniform_plan(4, 9);
    let log = logger();
    let mut steps = 0;

    let config = EngagementConfig {
        stop_on_error: true,
        ..Default::default()
    };
    let err = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(50)),
        &config,
        &log,
        &CancellationToken::new(),
        |_, _| steps += 1,
    )
    .await
    .unwrap_err();

    // The abort surfaces as a job-level failure the queue may retry
    assert!(matches!(err, JobError::Upstream(_)));
    assert!(err.is_retriable());
    assert_eq!(steps, 1);
    assert!(plan.actions.iter().all(|a| !a.executed));
    assert!(log
        .snapshot()
        .iter()
        .any(|line| line.message.contains("aborting engagement")));
}

#[tokio::test(start_paused = true)]
async fn progress_callback_fires_per_action() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(6, 2);
    let mut steps = Vec::new();

    run_engagement(
        &client,
        &mut plan,
        Some(feed_of(50)),
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |action, index| steps.push((action.index, index)),
    )
    .await
    .unwrap();

    assert_eq!(steps.len(), 6);
    assert!(steps.iter().enumerate().all(|(i, (a, b))| *a == i && *b == i));
}

#[tokio::test]
async fn cancellation_interrupts_the_sleep() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(3, 2);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_engagement(
        &client,
        &mut plan,
        Some(feed_of(50)),
        &EngagementConfig::default(),
        &logger(),
        &cancel,
        |_, _| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, JobError::Cancelled));
    assert!(client.likes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hot_feed_selection_uses_the_hot_feed() {
    let client = FakeSocialClient::new().with_hot_feed(feed_of(60));
    let mut plan = uniform_plan(2, 2);

    let config = EngagementConfig {
        feed: FeedSelection::Hot,
        ..Default::default()
    };
    let report = run_engagement(
        &client,
        &mut plan,
        None,
        &config,
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(report.success_count, 2);
    assert!(client.timeline_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_feed_is_an_upstream_error() {
    let client = FakeSocialClient::new();
    let mut plan = uniform_plan(3, 2);

    let err = run_engagement(
        &client,
        &mut plan,
        None,
        &EngagementConfig::default(),
        &logger(),
        &CancellationToken::new(),
        |_, _| {},
    )
    .await
    .unwrap_err();

    assert!(matches!(err, JobError::Upstream(_)));
    assert!(err.is_retriable());
}
