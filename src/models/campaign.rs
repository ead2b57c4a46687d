use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Cost of a single send when the campaign does not say otherwise.
pub const DEFAULT_COST_PER_SEND: f64 = 0.01;

/// A marketing push to one segment over one channel.
///
/// # Lifecycle
/// Campaigns start as `Draft`. Launching moves them to `Active` and records
/// their simulated results; from there they can be paused and resumed until
/// they are completed. Status only changes through those transitions, never
/// through a plain update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    /// Email subject line.
    pub subject: Option<String>,
    /// Message body or template.
    pub content: Option<String>,
    pub segment_id: Uuid,
    pub status: CampaignStatus,
    pub schedule_time: Option<DateTime<Utc>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub budget: f64,
    pub cost_per_send: f64,
    /// Automation steps, opaque to this service.
    pub workflow_steps: Vec<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The delivery channel of a campaign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignType {
    #[default]
    Email,
    Social,
    Ads,
    Sms,
}

impl CampaignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Social => "social",
            Self::Ads => "ads",
            Self::Sms => "sms",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "social" => Some(Self::Social),
            "ads" => Some(Self::Ads),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

/// The lifecycle status of a campaign.
///
/// - `Draft`: Editable, not yet sent
/// - `Active`: Launched, results recorded
/// - `Paused`: Temporarily stopped, can be resumed
/// - `Completed`: Finished, `end_date` set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Check that a lifecycle action is allowed from this status and return
    /// the status it leads to.
    pub fn transition(self, action: CampaignAction) -> Result<CampaignStatus> {
        use CampaignAction::*;
        use CampaignStatus::*;

        match (self, action) {
            (Draft, Launch) => Ok(Active),
            (Active, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Active),
            (Active | Paused, Complete) => Ok(Completed),
            (from, action) => Err(Error::validation(format!(
                "Cannot {} a {} campaign",
                action.as_str(),
                from.as_str()
            ))),
        }
    }
}

/// Operator actions that move a campaign through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignAction {
    Launch,
    Pause,
    Resume,
    Complete,
}

impl CampaignAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
        }
    }
}

/// Input for creating a new campaign. New campaigns are always drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignInput {
    pub name: String,
    pub segment_id: Uuid,
    #[serde(default)]
    pub campaign_type: Option<CampaignType>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub cost_per_send: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workflow_steps: Option<Vec<serde_json::Value>>,
}

impl CreateCampaignInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Campaign name is required"));
        }
        validate_money(self.budget, self.cost_per_send)
    }
}

/// Input for updating a campaign. All fields are optional for partial updates.
///
/// `description`, `subject` and `content` are cleared by sending an empty
/// string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCampaignInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub campaign_type: Option<CampaignType>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub segment_id: Option<Uuid>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub budget: Option<f64>,
    pub cost_per_send: Option<f64>,
    pub workflow_steps: Option<Vec<serde_json::Value>>,
}

impl UpdateCampaignInput {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::validation("Campaign name cannot be empty"));
        }
        validate_money(self.budget, self.cost_per_send)
    }
}

fn validate_money(budget: Option<f64>, cost_per_send: Option<f64>) -> Result<()> {
    if budget.is_some_and(|b| !b.is_finite() || b < 0.0) {
        return Err(Error::validation("Budget must be a non-negative amount"));
    }
    if cost_per_send.is_some_and(|c| !c.is_finite() || c < 0.0) {
        return Err(Error::validation("Cost per send must be a non-negative amount"));
    }
    Ok(())
}

/// Query parameters for listing campaigns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<CampaignStatus>,
}

/// Simulated delivery and engagement figures recorded when a campaign launches.
///
/// Exactly one result exists per launched campaign; drafts have none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignResult {
    pub campaign_id: Uuid,
    pub total_sent: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub impressions: i64,
    pub opens: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub leads_generated: i64,
    pub leads_converted: i64,
    pub revenue: f64,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

/// A launched campaign together with the result recorded for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignLaunch {
    pub campaign: Campaign,
    pub result: CampaignResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_only_from_draft() {
        assert_eq!(
            CampaignStatus::Draft.transition(CampaignAction::Launch).unwrap(),
            CampaignStatus::Active
        );
        for status in [
            CampaignStatus::Active,
            CampaignStatus::Paused,
            CampaignStatus::Completed,
        ] {
            assert!(status.transition(CampaignAction::Launch).is_err());
        }
    }

    #[test]
    fn pause_resume_complete() {
        let paused = CampaignStatus::Active
            .transition(CampaignAction::Pause)
            .unwrap();
        assert_eq!(paused, CampaignStatus::Paused);
        assert_eq!(
            paused.transition(CampaignAction::Resume).unwrap(),
            CampaignStatus::Active
        );
        assert_eq!(
            paused.transition(CampaignAction::Complete).unwrap(),
            CampaignStatus::Completed
        );
        assert!(CampaignStatus::Draft
            .transition(CampaignAction::Complete)
            .is_err());
        assert!(CampaignStatus::Completed
            .transition(CampaignAction::Resume)
            .is_err());
    }

    #[test]
    fn rejects_negative_budget() {
        let input = UpdateCampaignInput {
            budget: Some(-5.0),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
