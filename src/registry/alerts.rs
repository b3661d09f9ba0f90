//! Fault reports submitted by agents
//!
//! Identical reports from the same agent inside the dedupe window are folded
//! into the existing entry instead of flooding the log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::AgentId;

/// A recorded fault report
#[derive(Debug, Clone, Serialize)]
pub struct AgentAlert {
    pub agent: AgentId,
    pub description: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of identical reports folded into this entry
    pub repeat_count: u32,
}

/// Configuration for the alert log
#[derive(Debug, Clone)]
pub struct AlertLogConfig {
    /// Entries kept before the oldest is evicted (default: 512)
    pub capacity: usize,
    /// Identical reports within this many seconds are folded (default: 60s)
    pub dedupe_window_secs: u64,
}

impl Default for AlertLogConfig {
    fn default() -> Self {
        Self {
            capacity: 512,
            dedupe_window_secs: 60,
        }
    }
}

/// Bounded, newest-last history of agent alerts
pub struct AlertLog {
    config: AlertLogConfig,
    entries: RwLock<VecDeque<AgentAlert>>,
}

impl AlertLog {
    pub fn new(config: AlertLogConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AlertLogConfig::default())
    }

    /// Record a report, returning the entry it was stored in
    pub async fn record(&self, agent: AgentId, description: &str, now: DateTime<Utc>) -> AgentAlert {
        let window = crate::config::secs(self.config.dedupe_window_secs);
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.iter_mut().rev().find(|e| {
            e.agent == agent
                && e.description == description
                && now.signed_duration_since(e.last_seen) <= window
        }) {
            existing.last_seen = now;
            existing.repeat_count += 1;
            debug!(
                "Folded repeated alert from {} ({} repeats)",
                agent, existing.repeat_count
            );
            return existing.clone();
        }

        let alert = AgentAlert {
            agent,
            description: description.to_string(),
            first_seen: now,
            last_seen: now,
            repeat_count: 0,
        };
        entries.push_back(alert.clone());
        while entries.len() > self.config.capacity {
            entries.pop_front();
        }

        alert
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Most recent entries, newest first
    pub async fn recent(&self, limit: usize) -> Vec<AgentAlert> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_repeats_are_folded() {
        let log = AlertLog::with_defaults();
        let agent = AgentId::new();
        let t0 = Utc::now();

        log.record(agent, "stuck", t0).await;
        let folded = log.record(agent, "stuck", t0 + Duration::seconds(10)).await;

        assert_eq!(folded.repeat_count, 1);
        assert_eq!(log.recent(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_repeats_outside_window_are_new_entries() {
        let log = AlertLog::with_defaults();
        let agent = AgentId::new();
        let t0 = Utc::now();

        log.record(agent, "stuck", t0).await;
        log.record(agent, "stuck", t0 + Duration::seconds(120)).await;

        assert_eq!(log.recent(10).await.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let log = AlertLog::new(AlertLogConfig {
            capacity: 2,
            dedupe_window_secs: 60,
        });
        let agent = AgentId::new();
        let now = Utc::now();

        log.record(agent, "a", now).await;
        log.record(agent, "b", now).await;
        log.record(agent, "c", now).await;

        let recent = log.recent(10).await;
        let descriptions: Vec<_> = recent.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(descriptions, vec!["c", "b"]);
    }
}
