//! Agent registry with heartbeat-based liveness
//!
//! Agents register once, then heartbeat periodically. An agent whose last
//! heartbeat is older than the configured timeout is stale for every caller
//! that asks, whether or not the expiration service has flagged it yet.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::alerts::{AgentAlert, AlertLog};
use crate::domain::AgentId;
use crate::error::{OperatorError, Result};

/// Agent liveness status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgentStatus {
    /// Heartbeating normally
    Active,
    /// Missed its heartbeat deadline
    Stale,
    /// Live, but has reported a fault since it last went stale
    Alerting,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Stale => write!(f, "stale"),
            AgentStatus::Alerting => write!(f, "alerting"),
        }
    }
}

/// A registered agent
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub status: AgentStatus,
}

/// Per-status agent counts
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AgentCounts {
    pub active: usize,
    pub stale: usize,
    pub alerting: usize,
}

/// Registry of every agent that has ever registered
pub struct AgentRegistry {
    heartbeat_timeout: Duration,
    agents: Arc<RwLock<HashMap<AgentId, Agent>>>,
    alerts: AlertLog,
}

impl AgentRegistry {
    pub fn new(heartbeat_timeout_secs: u64) -> Self {
        Self {
            heartbeat_timeout: crate::config::secs(heartbeat_timeout_secs),
            agents: Arc::new(RwLock::new(HashMap::new())),
            alerts: AlertLog::with_defaults(),
        }
    }

    /// Register a new agent
    pub async fn register(&self) -> Agent {
        self.register_at(Utc::now()).await
    }

    pub async fn register_at(&self, now: DateTime<Utc>) -> Agent {
        let agent = Agent {
            id: AgentId::new(),
            registered_at: now,
            last_heartbeat: now,
            status: AgentStatus::Active,
        };

        self.agents.write().await.insert(agent.id, agent.clone());
        info!("Registered agent {}", agent.id);

        agent
    }

    /// Record a heartbeat. Clears the stale flag.
    pub async fn heartbeat(&self, id: AgentId) -> Result<Agent> {
        self.heartbeat_at(id, Utc::now()).await
    }

    pub async fn heartbeat_at(&self, id: AgentId, now: DateTime<Utc>) -> Result<Agent> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or(OperatorError::UnknownAgent(id))?;

        agent.last_heartbeat = now;
        if agent.status == AgentStatus::Stale {
            agent.status = AgentStatus::Active;
            info!("Agent {} recovered from stale state", id);
        } else {
            debug!("Heartbeat from agent {}", id);
        }

        Ok(agent.clone())
    }

    /// Record a fault report. Does not affect dispatch or holds.
    pub async fn alert(&self, id: AgentId, description: &str) -> Result<AgentAlert> {
        self.alert_at(id, description, Utc::now()).await
    }

    pub async fn alert_at(
        &self,
        id: AgentId,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<AgentAlert> {
        {
            let mut agents = self.agents.write().await;
            let agent = agents.get_mut(&id).ok_or(OperatorError::UnknownAgent(id))?;
            if agent.status == AgentStatus::Active {
                agent.status = AgentStatus::Alerting;
            }
        }

        let alert = self.alerts.record(id, description, now).await;
        warn!("Agent {} alert: {}", id, description);

        Ok(alert)
    }

    /// Look up an agent
    pub async fn get(&self, id: AgentId) -> Option<Agent> {
        self.agents.read().await.get(&id).cloned()
    }

    /// Look up an agent, failing with `UnknownAgent`
    pub async fn require(&self, id: AgentId) -> Result<Agent> {
        self.get(id).await.ok_or(OperatorError::UnknownAgent(id))
    }

    /// Whether the agent is registered and within its heartbeat deadline
    pub async fn is_live_at(&self, id: AgentId, now: DateTime<Utc>) -> Result<bool> {
        let agent = self.require(id).await?;
        Ok(self.agent_is_live(&agent, now))
    }

    fn agent_is_live(&self, agent: &Agent, now: DateTime<Utc>) -> bool {
        agent.status != AgentStatus::Stale
            && now.signed_duration_since(agent.last_heartbeat) <= self.heartbeat_timeout
    }

    /// Flag every agent past its heartbeat deadline as stale.
    ///
    /// Returns only the agents that transitioned during this call.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Vec<AgentId> {
        let mut expired = Vec::new();
        let mut agents = self.agents.write().await;

        for agent in agents.values_mut() {
            if agent.status == AgentStatus::Stale {
                continue;
            }
            if now.signed_duration_since(agent.last_heartbeat) > self.heartbeat_timeout {
                agent.status = AgentStatus::Stale;
                expired.push(agent.id);
                warn!(
                    "Agent {} is stale (last heartbeat: {})",
                    agent.id, agent.last_heartbeat
                );
            }
        }

        expired.sort();
        expired
    }

    /// Every agent currently flagged stale, sorted
    pub async fn stale_agents(&self) -> Vec<AgentId> {
        let agents = self.agents.read().await;
        let mut stale: Vec<AgentId> = agents
            .values()
            .filter(|a| a.status == AgentStatus::Stale)
            .map(|a| a.id)
            .collect();
        stale.sort();
        stale
    }

    /// Agent counts by status
    pub async fn counts(&self) -> AgentCounts {
        let agents = self.agents.read().await;
        let mut counts = AgentCounts::default();
        for agent in agents.values() {
            match agent.status {
                AgentStatus::Active => counts.active += 1,
                AgentStatus::Stale => counts.stale += 1,
                AgentStatus::Alerting => counts.alerting += 1,
            }
        }
        counts
    }

    /// Most recent fault reports, newest first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<AgentAlert> {
        self.alerts.recent(limit).await
    }

    /// Fault reports currently retained
    pub async fn alert_count(&self) -> usize {
        self.alerts.len().await
    }
}
