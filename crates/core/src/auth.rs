// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three-stage credential recovery
//!
//! Refresh, then resume, then fresh password login; the first method that
//! succeeds wins. Rotated tokens are pushed back to the account store as a
//! side-effect. Concurrent jobs for one account may race on that write;
//! last-writer-wins is acceptable because upstream refresh tokens are
//! idempotent, so no per-account mutex sits in the hot path.

use crate::adapters::{AccountStore, SocialClient, TokenUpdate};
use crate::error::JobError;
use crate::logsink::JobLogger;
use crate::session::{AccountMetadata, SessionData};
use std::sync::Arc;

/// Yields an authenticated client session for one job
///
/// Re-runnable mid-job: an executor that detects a lapsed session may
/// request a fresh coordination with the same coordinator.
pub struct AuthCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for AuthCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AccountStore> AuthCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run the three methods in order; mutates `session` with whatever the
    /// winning method returned.
    pub async fn establish<C: SocialClient>(
        &self,
        client: &C,
        session: &mut SessionData,
        metadata: &AccountMetadata,
        log: &JobLogger,
    ) -> Result<(), JobError> {
        let mut last_cause = String::new();

        // Method 1: rotate tokens with the refresh token
        if !session.refresh_token.is_empty() {
            match client.refresh_session(&session.refresh_token).await {
                Ok(tokens) => {
                    session.access_token = tokens.access_token.clone();
                    session.refresh_token = tokens.refresh_token.clone();
                    session.did = tokens.did.clone();
                    self.persist(
                        metadata,
                        TokenUpdate {
                            access_token: tokens.access_token,
                            refresh_token: tokens.refresh_token,
                            did: Some(tokens.did),
                            email: None,
                        },
                        log,
                    )
                    .await;
                    log.info("session refreshed, tokens rotated");
                    return Ok(());
                }
                Err(e) => {
                    last_cause = format!("refresh failed: {}", e);
                    log.warn(&last_cause);
                }
            }
        } else {
            last_cause = "refresh skipped: no refresh token".to_string();
        }

        // Method 2: treat the stored session as valid and resume it.
        // A missing DID fails the method; fabricating one would poison
        // every downstream write.
        if session.did.is_empty() {
            last_cause = "resume failed: DID missing".to_string();
            log.warn(&last_cause);
        } else {
            match client.resume_session(session).await {
                Ok(()) => {
                    log.info("resumed existing session");
                    return Ok(());
                }
                Err(e) => {
                    last_cause = format!("resume failed: {}", e);
                    log.warn(&last_cause);
                }
            }
        }

        // Method 3: full password login
        if let Some(password) = metadata.password.as_deref() {
            match client.login(session.login_identifier(), password).await {
                Ok(tokens) => {
                    session.access_token = tokens.access_token.clone();
                    session.refresh_token = tokens.refresh_token.clone();
                    session.did = tokens.did.clone();
                    if tokens.email.is_some() {
                        session.email = tokens.email.clone();
                    }
                    self.persist(
                        metadata,
                        TokenUpdate {
                            access_token: tokens.access_token,
                            refresh_token: tokens.refresh_token,
                            did: Some(tokens.did),
                            email: tokens.email,
                        },
                        log,
                    )
                    .await;
                    log.info("logged in with account credentials");
                    return Ok(());
                }
                Err(e) => {
                    last_cause = format!("login failed: {}", e);
                    log.warn(&last_cause);
                }
            }
        } else if !last_cause.is_empty() {
            last_cause = format!("{}; no password for fresh login", last_cause);
        } else {
            last_cause = "no password for fresh login".to_string();
        }

        Err(JobError::AuthExhausted(last_cause))
    }

    /// Push rotated tokens back to the account store. Write failures are
    /// logged but never fail the job; the session itself is valid.
    async fn persist(&self, metadata: &AccountMetadata, update: TokenUpdate, log: &JobLogger) {
        if metadata.account_id.is_empty() {
            log.debug("no account id on job; rotated tokens not persisted");
            return;
        }
        if let Err(e) = self.store.update_tokens(&metadata.account_id, update).await {
            log.warn(format!("token persistence failed: {}", e));
        }
    }
}
