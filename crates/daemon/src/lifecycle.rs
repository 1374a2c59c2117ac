// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon wiring and lifecycle
//!
//! The daemon runs the execution substrate on the in-process queue
//! backend. The social client and account store are capability traits;
//! this binary wires the in-process simulator for them, so a deployment
//! binds its own implementations at the edge while everything inside the
//! substrate is exercised for real.

use murmur_adapters::{HttpBlobFetcher, TracedSocialClient};
use murmur_core::adapters::{
    ClientFactory, FakeAccountStore, FakeSocialClient, FetchError, NoScaler,
};
use murmur_core::clock::SystemClock;
use murmur_core::config::Config;
use murmur_core::dispatch::Dispatcher;
use murmur_core::events::{EventBus, FanoutHub};
use murmur_core::id::UuidIdGen;
use murmur_core::intake::{Intake, QueueCreatedHook};
use murmur_core::pool::{PoolConfig, WorkerContext, WorkerFleet};
use murmur_core::queue::MemoryQueue;
use murmur_core::random::ThreadRand;
use murmur_core::registry::QueueRegistry;
use murmur_core::session::AccountMetadata;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("blob fetcher: {0}")]
    Fetcher(#[from] FetchError),
}

/// Client factory for the in-process simulator, traced like a real one
#[derive(Clone)]
pub struct DevClientFactory {
    client: FakeSocialClient,
}

impl DevClientFactory {
    pub fn new() -> Self {
        Self {
            client: FakeSocialClient::new(),
        }
    }
}

impl Default for DevClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for DevClientFactory {
    type Client = TracedSocialClient<FakeSocialClient>;

    fn create(&self, metadata: &AccountMetadata) -> Self::Client {
        if let Some(proxy) = &metadata.proxy {
            tracing::debug!(proxy, account_id = %metadata.account_id, "client with proxy");
        }
        TracedSocialClient::new(self.client.clone())
    }
}

type Backend = MemoryQueue<SystemClock>;

/// Everything a connection handler needs
pub struct Daemon {
    pub config: Config,
    pub started: Instant,
    pub bus: EventBus,
    pub hub: FanoutHub<SystemClock>,
    pub registry: Arc<QueueRegistry<Backend>>,
    pub fleet: Arc<WorkerFleet<Backend>>,
    pub intake: Intake<Backend, FakeAccountStore, UuidIdGen>,
    pub shutdown: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn new(config: Config) -> Result<Self, LifecycleError> {
        let clock = SystemClock;
        let bus = EventBus::new();
        let backend = Arc::new(MemoryQueue::new(clock.clone()));
        let store = Arc::new(FakeAccountStore::new());

        let hub = FanoutHub::new(clock);
        let pump = hub.attach(&bus);

        let sweeper = tokio::spawn({
            let hub = hub.clone();
            async move {
                let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    hub.cache().sweep();
                }
            }
        });

        let registry = Arc::new(QueueRegistry::new(Arc::clone(&backend), bus.clone()));

        let dispatcher = Dispatcher::new(
            Arc::new(DevClientFactory::new()),
            Arc::clone(&store),
            Arc::new(HttpBlobFetcher::new()?),
            Arc::new(NoScaler),
            ThreadRand,
        );

        let fleet = Arc::new(WorkerFleet::new(
            WorkerContext {
                backend,
                bus: bus.clone(),
                runner: Arc::new(dispatcher),
            },
            PoolConfig {
                concurrency: config.concurrency_default,
                ..Default::default()
            },
        ));

        let hook: QueueCreatedHook = {
            let fleet = Arc::clone(&fleet);
            Arc::new(move |queue: String| {
                let fleet = Arc::clone(&fleet);
                tokio::spawn(async move {
                    fleet.ensure_pool(&queue).await;
                });
            })
        };

        let intake = Intake::new(
            Arc::clone(&registry),
            store,
            UuidIdGen,
            bus.clone(),
        )
        .on_queue_created(hook);

        Ok(Self {
            config,
            started: Instant::now(),
            bus,
            hub,
            registry,
            fleet,
            intake,
            shutdown: CancellationToken::new(),
            background: vec![pump, sweeper],
        })
    }

    /// Drain pools, stop projections, and kill background tasks
    pub async fn stop(&self) {
        tracing::info!("daemon stopping");
        self.fleet.shutdown_all().await;
        self.registry.shutdown();
        for task in &self.background {
            task.abort();
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn daemon_wires_and_stops_cleanly() {
        let daemon = Daemon::new(Config::default()).unwrap();
        assert_eq!(daemon.registry.queue_names().len(), 0);
        assert_eq!(daemon.fleet.pool_count().await, 0);
        daemon.stop().await;
    }
}
