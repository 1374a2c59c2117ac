// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job authentication snapshot and account metadata
//!
//! `SessionData` is mutated freely by the auth coordinator during a job;
//! only rotated tokens are pushed back to the account store. The mutated
//! final form is never persisted on the job itself.

use serde::{Deserialize, Serialize};

/// Authentication snapshot carried on a job payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Durable account identifier; empty means unknown
    #[serde(default)]
    pub did: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
}

impl SessionData {
    /// The identifier used for a fresh password login
    pub fn login_identifier(&self) -> &str {
        if !self.handle.is_empty() {
            &self.handle
        } else {
            self.email.as_deref().unwrap_or_default()
        }
    }
}

/// Account-level settings carried alongside the session on each job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetadata {
    #[serde(default)]
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}
