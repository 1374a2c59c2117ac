use super::*;
use crate::clock::FakeClock;
use crate::job::{JobType, LogLevel};
use std::time::Duration;
use tokio::time::timeout;

const Q: &str = "bsky-engagement-t1";

fn backend() -> (MemoryQueue<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    (MemoryQueue::new(clock.clone()), clock)
}

fn job(id: &str) -> Job {
    Job::new(id, "t1", JobType::Engagement, serde_json::json!({}))
}

async fn claim_now(backend: &MemoryQueue<FakeClock>) -> Lease {
    timeout(Duration::from_secs(2), backend.claim(Q, "w-1"))
        .await
        .expect("claim timed out")
        .expect("claim failed")
}

#[tokio::test]
async fn claims_by_priority_then_fifo() {
    let (backend, _clock) = backend();

    let low = JobOptions {
        priority: 0,
        ..Default::default()
    };
    let high = JobOptions {
        priority: 10,
        ..Default::default()
    };
    backend.enqueue(Q, job("first-low"), &low).await.unwrap();
    backend.enqueue(Q, job("second-low"), &low).await.unwrap();
    backend.enqueue(Q, job("late-high"), &high).await.unwrap();

    assert_eq!(claim_now(&backend).await.job.id, "late-high");
    assert_eq!(claim_now(&backend).await.job.id, "first-low");
    assert_eq!(claim_now(&backend).await.job.id, "second-low");
}

#[tokio::test]
async fn delayed_job_waits_for_its_hold() {
    let (backend, clock) = backend();
    let opts = JobOptions {
        delay: Some(Duration::from_secs(60)),
        ..Default::default()
    };
    backend.enqueue(Q, job("held"), &opts).await.unwrap();

    // Not claimable yet
    assert!(timeout(Duration::from_millis(100), backend.claim(Q, "w-1"))
        .await
        .is_err());

    clock.advance_secs(61);
    assert_eq!(claim_now(&backend).await.job.id, "held");
}

#[tokio::test]
async fn claim_marks_active_and_counts_attempt() {
    let (backend, _clock) = backend();
    backend
        .enqueue(Q, job("j1"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    assert_eq!(lease.job.state, JobState::Active);
    assert_eq!(lease.job.attempts, 1);
    assert!(lease.job.processed_at.is_some());
}

#[tokio::test]
async fn complete_stores_result_and_logs_and_signals() {
    let (backend, _clock) = backend();
    let mut obs = backend.observe(Q);
    backend
        .enqueue(Q, job("j1"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    backend
        .complete(
            Q,
            "j1",
            &lease.token,
            serde_json::json!({"likes": 7}),
            vec![LogEntry::new(LogLevel::Info, "done")],
        )
        .await
        .unwrap();

    let stored = backend.get_job(Q, "j1").await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.progress, 100);
    assert_eq!(stored.logs.len(), 1);
    assert!(stored.finished_at.is_some());

    let signal = obs.recv().await.unwrap();
    assert!(matches!(signal, QueueSignal::Completed { ref job_id, .. } if job_id == "j1"));
}

#[tokio::test]
async fn retriable_failure_backs_off_then_redelivers() {
    let (backend, clock) = backend();
    backend
        .enqueue(Q, job("flaky"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    backend
        .fail(
            Q,
            "flaky",
            &lease.token,
            FailureReport::retriable("upstream flap"),
            vec![],
        )
        .await
        .unwrap();

    // Back in waiting, but held for the 5s backoff
    let stored = backend.get_job(Q, "flaky").await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Waiting);
    assert!(timeout(Duration::from_millis(100), backend.claim(Q, "w-1"))
        .await
        .is_err());

    clock.advance_secs(6);
    let lease = claim_now(&backend).await;
    assert_eq!(lease.job.id, "flaky");
    assert_eq!(lease.job.attempts, 2);
}

#[tokio::test]
async fn attempts_exhaust_into_terminal_failure() {
    let (backend, clock) = backend();
    let mut obs = backend.observe(Q);
    let opts = JobOptions {
        attempts: 2,
        ..Default::default()
    };
    backend.enqueue(Q, job("doomed"), &opts).await.unwrap();

    for _ in 0..2 {
        clock.advance_secs(35);
        let lease = claim_now(&backend).await;
        backend
            .fail(
                Q,
                "doomed",
                &lease.token,
                FailureReport::retriable("still broken"),
                vec![],
            )
            .await
            .unwrap();
    }

    let stored = backend.get_job(Q, "doomed").await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.error.as_deref(), Some("still broken"));

    let signal = obs.recv().await.unwrap();
    assert!(matches!(signal, QueueSignal::Failed { ref job_id, .. } if job_id == "doomed"));
}

#[tokio::test]
async fn terminal_failure_skips_remaining_attempts() {
    let (backend, _clock) = backend();
    backend
        .enqueue(Q, job("badauth"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    backend
        .fail(
            Q,
            "badauth",
            &lease.token,
            FailureReport::terminal("auth exhausted: bad password"),
            vec![],
        )
        .await
        .unwrap();

    let stored = backend.get_job(Q, "badauth").await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);
    assert_eq!(stored.attempts, 1);
}

#[tokio::test]
async fn missed_renewals_stall_then_fail_permanently() {
    let (backend, clock) = backend();
    let mut obs = backend.observe(Q);
    backend
        .enqueue(Q, job("sleepy"), &JobOptions::default())
        .await
        .unwrap();

    // First lease expires: one stall detection, job redelivered
    let _lease = claim_now(&backend).await;
    clock.advance_secs(31);
    let lease = claim_now(&backend).await;
    assert_eq!(lease.job.id, "sleepy");
    assert_eq!(lease.job.attempts, 2);

    let signal = obs.recv().await.unwrap();
    assert!(matches!(signal, QueueSignal::Stalled { ref job_id, .. } if job_id == "sleepy"));

    // Second expiry passes the stall threshold
    clock.advance_secs(31);
    assert!(timeout(Duration::from_millis(300), backend.claim(Q, "w-1"))
        .await
        .is_err());

    let stored = backend.get_job(Q, "sleepy").await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Failed);

    let signal = obs.recv().await.unwrap();
    assert!(matches!(signal, QueueSignal::Failed { ref job_id, .. } if job_id == "sleepy"));
}

#[tokio::test]
async fn renewal_keeps_the_lease_alive() {
    let (backend, clock) = backend();
    backend
        .enqueue(Q, job("steady"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    for _ in 0..3 {
        clock.advance_secs(20);
        backend
            .renew_lease(Q, "steady", &lease.token)
            .await
            .unwrap();
    }

    // 60s elapsed but renewals kept it active; no redelivery
    assert!(timeout(Duration::from_millis(300), backend.claim(Q, "w-2"))
        .await
        .is_err());

    backend
        .complete(Q, "steady", &lease.token, serde_json::json!({}), vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn wrong_token_is_lease_lost() {
    let (backend, _clock) = backend();
    backend
        .enqueue(Q, job("j1"), &JobOptions::default())
        .await
        .unwrap();

    let _lease = claim_now(&backend).await;
    let err = backend
        .complete(Q, "j1", "forged-token", serde_json::json!({}), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::LeaseLost(_)));
}

#[tokio::test]
async fn progress_signals_are_monotonic() {
    let (backend, _clock) = backend();
    let mut obs = backend.observe(Q);
    backend
        .enqueue(Q, job("j1"), &JobOptions::default())
        .await
        .unwrap();

    let lease = claim_now(&backend).await;
    backend.report_progress(Q, "j1", &lease.token, 40).await.unwrap();
    backend.report_progress(Q, "j1", &lease.token, 20).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..2 {
        if let QueueSignal::Progress { progress, .. } = obs.recv().await.unwrap() {
            seen.push(progress);
        }
    }
    // A regressing report re-emits the held high-water mark
    assert_eq!(seen, vec![40, 40]);
}

#[tokio::test]
async fn list_by_parent_scans_children() {
    let (backend, _clock) = backend();
    let opts = JobOptions::default();
    backend
        .enqueue(Q, job("bulk-1:a").with_parent("bulk-1"), &opts)
        .await
        .unwrap();
    backend
        .enqueue(Q, job("bulk-1:b").with_parent("bulk-1"), &opts)
        .await
        .unwrap();
    backend.enqueue(Q, job("loner"), &opts).await.unwrap();

    let children = backend.list_by_parent(Q, "bulk-1").await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|j| j.parent_id.as_deref() == Some("bulk-1")));
}

#[tokio::test]
async fn retention_caps_completed_jobs() {
    let (backend, clock) = backend();
    let opts = JobOptions {
        remove_on_complete_count: 2,
        ..Default::default()
    };

    for i in 0..4 {
        let id = format!("done-{}", i);
        backend.enqueue(Q, job(&id), &opts).await.unwrap();
        let lease = claim_now(&backend).await;
        backend
            .complete(Q, &id, &lease.token, serde_json::json!({}), vec![])
            .await
            .unwrap();
        clock.advance_secs(1);
    }

    let completed = backend
        .list_by_state(Q, &[JobState::Completed])
        .await
        .unwrap();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0].id, "done-2");
}
