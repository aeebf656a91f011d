use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::states::TransitionOutcome;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Ingestion,
    Review,
    Ledger,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Review => "review",
            Self::Ledger => "ledger",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ingestion" => Some(Self::Ingestion),
            "review" => Some(Self::Review),
            "ledger" => Some(Self::Ledger),
            _ => None,
        }
    }
}

/// One row of a request's audit trail. Written in the same transaction as the change it records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub correlation_id: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        correlation_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            correlation_id: correlation_id.into(),
            metadata: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn for_transition(
        event_type: impl Into<String>,
        outcome: &TransitionOutcome,
        actor: impl Into<String>,
        correlation_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self::new(event_type, AuditCategory::Review, actor, correlation_id, occurred_at)
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str())
            .with_metadata("event", outcome.event.as_str())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
