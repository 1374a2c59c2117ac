// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue contract and the in-process backend
//!
//! The contract mirrors what an external durable queue provides: ordered
//! delivery, delayed jobs, exclusive leases with renewal, retry metadata,
//! and an observation stream per queue. `MemoryQueue` implements the full
//! contract in-process for the daemon and for tests.

mod backend;
mod memory;

pub use backend::{
    backoff_delay, FailureReport, JobOptions, Lease, QueueBackend, QueueError, QueueSignal,
    BACKOFF_BASE, BACKOFF_CAP, DEFAULT_LOCK_DURATION, MAX_STALLED_COUNT,
};
pub use memory::MemoryQueue;
