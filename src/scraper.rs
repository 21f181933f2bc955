//! The scrape-and-reconcile engine.
//!
//! One cycle fetches all three token populations (project, user,
//! group), publishes expiry metrics for every token observed, then
//! retracts series for identities that vanished since the previous
//! cycle. Fetch failures are counted and skipped; a cycle always runs
//! to completion with whatever subset of data it managed to fetch.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gitlab::TokenSource;
use crate::metrics::{ExporterMetrics, PopulationMetrics};

/// Label substituted when a per-token user lookup fails. Unlike
/// project/group scopes, user tokens are still published under this
/// fallback because ownership is resolved per token, not per scope.
const FALLBACK_USER_NAME: &str = "Unknown user";

pub struct TokenScraper<S> {
    source: S,
    metrics: Arc<ExporterMetrics>,
    project_ids: Vec<u64>,
    group_ids: Vec<u64>,
    // Identities with a live published series as of the previous cycle,
    // one set per population. Replaced wholesale at the end of each
    // population's reconciliation, never merged.
    known_project: HashSet<String>,
    known_user: HashSet<String>,
    known_group: HashSet<String>,
}

impl<S: TokenSource> TokenScraper<S> {
    pub fn new(
        source: S,
        metrics: Arc<ExporterMetrics>,
        project_ids: Vec<u64>,
        group_ids: Vec<u64>,
    ) -> Self {
        Self {
            source,
            metrics,
            project_ids,
            group_ids,
            known_project: HashSet::new(),
            known_user: HashSet::new(),
            known_group: HashSet::new(),
        }
    }

    /// Run one cycle immediately, then one per interval tick until the
    /// shutdown channel fires. Ticks never overlap: if a cycle outlasts
    /// the interval, the next tick is delayed rather than queued.
    /// Cancellation is observed only between cycles; an in-flight cycle
    /// runs to completion.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "starting token scraper");

        self.cycle().await;

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("token scraper stopped");
                    return;
                }
                _ = ticker.tick() => self.cycle().await,
            }
        }
    }

    /// One full scrape-and-reconcile pass across all populations.
    pub async fn cycle(&mut self) {
        let started = Instant::now();
        // Single reference instant: every expiry classification in this
        // cycle compares against the same "now".
        let now = Utc::now();
        debug!("starting token scrape");

        let (current, project_total) = self.scrape_project_tokens(now).await;
        reconcile(&self.metrics.project, &mut self.known_project, current, "project");
        self.metrics.project.set_total(project_total);

        let (current, user_total) = self.scrape_user_tokens(now).await;
        reconcile(&self.metrics.user, &mut self.known_user, current, "user");
        self.metrics.user.set_total(user_total);

        let (current, group_total) = self.scrape_group_tokens(now).await;
        reconcile(&self.metrics.group, &mut self.known_group, current, "group");
        self.metrics.group.set_total(group_total);

        self.metrics.set_last_scrape_time(now);
        let duration = started.elapsed();
        self.metrics.observe_scrape_duration(duration);
        info!(
            duration_ms = duration.as_millis() as u64,
            project_tokens = project_total,
            user_tokens = user_total,
            group_tokens = group_total,
            "token scrape complete"
        );
    }

    /// Fetch and publish project access tokens. Returns the identities
    /// observed this cycle and the total token count. A failed name
    /// lookup skips the scope's identities (the owner name is part of
    /// the identity key) but its tokens still count toward the total.
    async fn scrape_project_tokens(&self, now: DateTime<Utc>) -> (HashSet<String>, usize) {
        let mut current = HashSet::new();
        let mut total = 0;

        for &project_id in &self.project_ids {
            let tokens = match self.source.project_access_tokens(project_id).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(project_id, error = %e, "failed to list project access tokens");
                    self.metrics.inc_scrape_errors();
                    continue;
                }
            };
            total += tokens.len();

            let project_name = match self.source.project_name(project_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(project_id, error = %e, "failed to resolve project name");
                    self.metrics.inc_scrape_errors();
                    continue;
                }
            };

            for token in &tokens {
                let Some(expires_at) = expiry_instant(token.expires_at) else {
                    warn!(project_id, token = %token.name, "project token has no expiry date");
                    self.metrics.inc_scrape_errors();
                    continue;
                };

                let identity = identity(&project_name, project_id, &token.name);
                current.insert(identity.clone());
                self.metrics
                    .project
                    .publish(&identity, hours_until(expires_at, now), is_expired(expires_at, now));
                debug!(
                    project_id,
                    token = %token.name,
                    expires_at = %expires_at,
                    expired = is_expired(expires_at, now),
                    "published project token"
                );
            }
        }

        (current, total)
    }

    /// Fetch and publish the authenticated principal's personal access
    /// tokens. Ownership is resolved per token; a failed user lookup
    /// publishes under [`FALLBACK_USER_NAME`] instead of skipping.
    async fn scrape_user_tokens(&self, now: DateTime<Utc>) -> (HashSet<String>, usize) {
        let mut current = HashSet::new();

        let tokens = match self.source.personal_access_tokens().await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "failed to list personal access tokens");
                self.metrics.inc_scrape_errors();
                return (current, 0);
            }
        };
        let total = tokens.len();

        for token in &tokens {
            let Some(expires_at) = expiry_instant(token.expires_at) else {
                warn!(user_id = token.user_id, token = %token.name, "user token has no expiry date");
                self.metrics.inc_scrape_errors();
                continue;
            };

            let user_name = match self.source.user_name(token.user_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(user_id = token.user_id, error = %e, "failed to resolve user name");
                    self.metrics.inc_scrape_errors();
                    FALLBACK_USER_NAME.to_string()
                }
            };

            let identity = identity(&user_name, token.user_id, &token.name);
            current.insert(identity.clone());
            self.metrics
                .user
                .publish(&identity, hours_until(expires_at, now), is_expired(expires_at, now));
            debug!(
                user = %user_name,
                token = %token.name,
                expires_at = %expires_at,
                expired = is_expired(expires_at, now),
                "published user token"
            );
        }

        (current, total)
    }

    /// Fetch and publish group access tokens. Same shape as
    /// [`Self::scrape_project_tokens`], against the group endpoints.
    async fn scrape_group_tokens(&self, now: DateTime<Utc>) -> (HashSet<String>, usize) {
        let mut current = HashSet::new();
        let mut total = 0;

        for &group_id in &self.group_ids {
            let tokens = match self.source.group_access_tokens(group_id).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    warn!(group_id, error = %e, "failed to list group access tokens");
                    self.metrics.inc_scrape_errors();
                    continue;
                }
            };
            total += tokens.len();

            let group_name = match self.source.group_name(group_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(group_id, error = %e, "failed to resolve group name");
                    self.metrics.inc_scrape_errors();
                    continue;
                }
            };

            for token in &tokens {
                let Some(expires_at) = expiry_instant(token.expires_at) else {
                    warn!(group_id, token = %token.name, "group token has no expiry date");
                    self.metrics.inc_scrape_errors();
                    continue;
                };

                let identity = identity(&group_name, group_id, &token.name);
                current.insert(identity.clone());
                self.metrics
                    .group
                    .publish(&identity, hours_until(expires_at, now), is_expired(expires_at, now));
                debug!(
                    group_id,
                    token = %token.name,
                    expires_at = %expires_at,
                    expired = is_expired(expires_at, now),
                    "published group token"
                );
            }
        }

        (current, total)
    }
}

/// Retract series for identities that were published last cycle but not
/// observed this cycle, then swap in the current set as the new known
/// set. Runs after all of the population's scopes have been published,
/// so a re-observed token is never transiently retracted.
fn reconcile(
    metrics: &PopulationMetrics,
    known: &mut HashSet<String>,
    current: HashSet<String>,
    population: &'static str,
) {
    for stale in known.difference(&current) {
        metrics.retract(stale);
        info!(population, identity = %stale, "removed metrics for vanished token");
    }
    *known = current;
}

/// Composite metric label: owner display name, owner numeric ID, token
/// name, space-joined. Two live tokens collapsing to the same identity
/// is a documented last-write-wins limitation.
fn identity(owner_name: &str, owner_id: u64, token_name: &str) -> String {
    format!("{owner_name} {owner_id} {token_name}")
}

/// GitLab reports expiry as a bare date; anchor it at midnight UTC.
fn expiry_instant(date: Option<NaiveDate>) -> Option<DateTime<Utc>> {
    Some(date?.and_hms_opt(0, 0, 0)?.and_utc())
}

fn hours_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (expires_at - now).num_seconds() as f64 / 3600.0
}

/// Strict comparison: a token expiring exactly at the reference instant
/// is not yet expired.
fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at < now
}

// ── Tests ─────────────────────────────────────────────────────
