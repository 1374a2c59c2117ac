// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event routing for loose coupling and live observation
//!
//! This module provides:
//! - `EventBus` - process-local publish/subscribe keyed by event name
//! - `FanoutHub` - room-based selective delivery to live subscribers
//! - `JobStateCache` - last-known job projections for late subscribers

mod bus;
mod cache;
mod fanout;

pub use bus::{BusSubscription, EventBus, EventPattern, EventReceiver, EventSender, SubscriberId};
pub use cache::{CachedJob, JobStateCache};
pub use fanout::{EventEnvelope, EnvelopeReceiver, FanoutHub, Subscription};
