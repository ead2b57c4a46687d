use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Customer;
use crate::rules::{Criteria, Rule};

/// A named subset of customers defined by a rule.
///
/// Membership is never stored per customer. The segment caches how many
/// customers matched the last time it was refreshed, and `last_refreshed_at`
/// says when that was. Customers edited since then may make the count stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub criteria: Rule,
    pub segment_type: SegmentType,
    pub is_active: bool,
    pub customer_count: i64,
    /// `None` until the first refresh.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    #[default]
    Manual,
    Demographic,
    Behavioral,
    Purchase,
}

impl SegmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Demographic => "demographic",
            Self::Behavioral => "behavioral",
            Self::Purchase => "purchase",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "demographic" => Some(Self::Demographic),
            "behavioral" => Some(Self::Behavioral),
            "purchase" => Some(Self::Purchase),
            _ => None,
        }
    }
}

/// Input for creating a segment. Missing criteria select every customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSegmentInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: Option<Criteria>,
    #[serde(default)]
    pub segment_type: Option<SegmentType>,
}

/// Input for updating a segment. All fields are optional for partial updates.
///
/// An empty `description` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSegmentInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub criteria: Option<Criteria>,
    pub segment_type: Option<SegmentType>,
    pub is_active: Option<bool>,
}

/// Customers currently matching a segment. At most 100 are listed; `count`
/// is the full match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMembers {
    pub segment_id: Uuid,
    pub count: i64,
    pub customers: Vec<Customer>,
}
