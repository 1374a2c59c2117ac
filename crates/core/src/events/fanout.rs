// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Room-based fan-out of job events to live subscribers
//!
//! Rooms: `user:<tenantId>` (joined on connect), `job:<jobId>` and
//! `group:<parentId>` (joined explicitly). An event reaches a subscriber
//! only if the subscriber watches the job, watches the group, or the event
//! is addressed to the user room. High-volume telemetry (`job:progress`,
//! `job:log`) is never user-room addressed, so tenants are not flooded
//! with jobs they did not ask to observe.

use crate::clock::Clock;
use crate::event::Event;
use crate::events::bus::{BusSubscription, EventBus, EventPattern, SubscriberId};
use crate::events::cache::{CachedJob, JobStateCache};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// An event as delivered to a subscriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

impl EventEnvelope {
    pub fn new(event: Event) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Receiver half of a live subscription
pub type EnvelopeReceiver = mpsc::UnboundedReceiver<EventEnvelope>;

/// One live subscriber and its watch sets
#[derive(Debug, Clone)]
pub struct Subscription {
    pub subscriber_id: SubscriberId,
    pub tenant_id: String,
    pub watched_jobs: HashSet<String>,
    pub watched_groups: HashSet<String>,
}

impl Subscription {
    fn new(subscriber_id: SubscriberId, tenant_id: String) -> Self {
        Self {
            subscriber_id,
            tenant_id,
            watched_jobs: HashSet::new(),
            watched_groups: HashSet::new(),
        }
    }
}

struct SubscriberEntry {
    subscription: Subscription,
    tx: mpsc::UnboundedSender<EventEnvelope>,
}

#[derive(Default)]
struct HubState {
    subscribers: HashMap<SubscriberId, SubscriberEntry>,
    /// tenant id -> members of `user:<tenant>`
    user_rooms: HashMap<String, HashSet<SubscriberId>>,
    /// job id -> members of `job:<id>`
    job_rooms: HashMap<String, HashSet<SubscriberId>>,
    /// parent id -> members of `group:<parent>`
    group_rooms: HashMap<String, HashSet<SubscriberId>>,
}

/// Subscription graph and selective event delivery
pub struct FanoutHub<C: Clock> {
    state: Arc<RwLock<HubState>>,
    cache: Arc<JobStateCache<C>>,
}

impl<C: Clock> Clone for FanoutHub<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Lifecycle summaries go to the whole user room; progress and log
/// telemetry only to explicit watchers.
fn addressed_to_user_room(event: &Event) -> bool {
    !matches!(event, Event::JobProgress { .. } | Event::JobLog { .. })
}

impl<C: Clock> FanoutHub<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            cache: Arc::new(JobStateCache::new(clock)),
        }
    }

    pub fn cache(&self) -> &JobStateCache<C> {
        &self.cache
    }

    /// Connect a subscriber; joins `user:<tenant>` automatically
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> EnvelopeReceiver {
        let id = SubscriberId(subscriber_id.into());
        let tenant_id = tenant_id.into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .user_rooms
            .entry(tenant_id.clone())
            .or_default()
            .insert(id.clone());
        state.subscribers.insert(
            id.clone(),
            SubscriberEntry {
                subscription: Subscription::new(id, tenant_id),
                tx,
            },
        );
        rx
    }

    /// Disconnect and leave all rooms
    pub fn disconnect(&self, subscriber_id: &SubscriberId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = state.subscribers.remove(subscriber_id) else {
            return;
        };
        let sub = entry.subscription;
        if let Some(room) = state.user_rooms.get_mut(&sub.tenant_id) {
            room.remove(subscriber_id);
        }
        for job in &sub.watched_jobs {
            if let Some(room) = state.job_rooms.get_mut(job) {
                room.remove(subscriber_id);
            }
        }
        for group in &sub.watched_groups {
            if let Some(room) = state.group_rooms.get_mut(group) {
                room.remove(subscriber_id);
            }
        }
    }

    /// Watch a job; returns the cached projection for replay, if any
    pub fn monitor_job(&self, subscriber_id: &SubscriberId, job_id: &str) -> Option<CachedJob> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.subscribers.get_mut(subscriber_id) {
            entry.subscription.watched_jobs.insert(job_id.to_string());
            state
                .job_rooms
                .entry(job_id.to_string())
                .or_default()
                .insert(subscriber_id.clone());
        }
        drop(state);
        self.cache.get(job_id)
    }

    /// Watch a bulk group
    pub fn monitor_group(&self, subscriber_id: &SubscriberId, parent_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.subscribers.get_mut(subscriber_id) {
            entry
                .subscription
                .watched_groups
                .insert(parent_id.to_string());
            state
                .group_rooms
                .entry(parent_id.to_string())
                .or_default()
                .insert(subscriber_id.clone());
        }
    }

    /// Stop watching a job
    pub fn unmonitor_job(&self, subscriber_id: &SubscriberId, job_id: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = state.subscribers.get_mut(subscriber_id) {
            entry.subscription.watched_jobs.remove(job_id);
        }
        if let Some(room) = state.job_rooms.get_mut(job_id) {
            room.remove(subscriber_id);
        }
    }

    /// Deliver one event: update the cache, then fan out to the candidate
    /// rooms under the selective-delivery rule.
    pub fn deliver(&self, event: &Event) {
        self.cache.apply(event);

        let state = self.state.read().unwrap_or_else(|e| e.into_inner());

        let mut candidates: HashSet<&SubscriberId> = HashSet::new();
        if let Some(room) = state.user_rooms.get(event.tenant_id()) {
            candidates.extend(room.iter());
        }
        if let Some(job_id) = event.job_id() {
            if let Some(room) = state.job_rooms.get(job_id) {
                candidates.extend(room.iter());
            }
        }
        if let Some(parent_id) = event.parent_id() {
            if let Some(room) = state.group_rooms.get(parent_id) {
                candidates.extend(room.iter());
            }
        }

        let user_room_event = addressed_to_user_room(event);
        let envelope = EventEnvelope::new(event.clone());

        for id in candidates {
            let Some(entry) = state.subscribers.get(id) else {
                continue;
            };
            let sub = &entry.subscription;
            let watches_job = event
                .job_id()
                .is_some_and(|j| sub.watched_jobs.contains(j));
            let watches_group = event
                .parent_id()
                .is_some_and(|p| sub.watched_groups.contains(p));
            let in_user_room = sub.tenant_id == event.tenant_id();

            if watches_job || watches_group || (user_room_event && in_user_room) {
                let _ = entry.tx.send(envelope.clone());
            }
        }
    }

    /// Pump the event bus into this hub on a background task
    pub fn attach(&self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe(BusSubscription::new(
            "fanout-hub",
            vec![EventPattern::new("job:**"), EventPattern::new("worker:**")],
        ));
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                hub.deliver(&event);
            }
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .subscribers
            .len()
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
