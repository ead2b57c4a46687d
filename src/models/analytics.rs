use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CampaignStatus, CampaignType};

/// Restricts which campaign results an analytics report reads.
///
/// `from` and `to` bound the time the result was recorded (inclusive).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub campaign_id: Option<Uuid>,
}

/// Raw counts with the rates derived from them. Rates are fractions in
/// `0.0..=1.0` (ROI is unbounded) and are zero when their denominator is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStats {
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
    pub delivery_rate: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub ctr: f64,
    pub conversion_rate: f64,
    pub roi: f64,
}

/// Dashboard totals across every campaign in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsOverview {
    pub total_campaigns: i64,
    pub draft_campaigns: i64,
    pub active_campaigns: i64,
    pub paused_campaigns: i64,
    pub completed_campaigns: i64,
    pub total_sent: i64,
    pub total_delivered: i64,
    pub total_opens: i64,
    pub total_clicks: i64,
    pub total_conversions: i64,
    pub total_revenue: f64,
    pub total_cost: f64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub conversion_rate: f64,
    pub roi: f64,
    pub total_customers: i64,
    pub total_segments: i64,
    pub total_leads: i64,
}

/// One row of the ROI report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiEntry {
    pub campaign_id: Uuid,
    pub campaign_name: String,
    pub campaign_type: CampaignType,
    pub status: CampaignStatus,
    pub revenue: f64,
    pub cost: f64,
    pub roi: f64,
    pub conversions: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiReport {
    pub campaigns: Vec<RoiEntry>,
}

/// One funnel stage.
///
/// `share_of_sent` is `count / sent`. `drop_off` is how many were lost since
/// the previous stage (never negative) and `drop_off_rate` that loss as a
/// fraction of the previous stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub name: String,
    pub count: i64,
    pub share_of_sent: f64,
    pub drop_off: i64,
    pub drop_off_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelReport {
    /// Sent, Delivered, Opened, Clicked, Converted.
    pub stages: Vec<FunnelStage>,
    /// Leads branch off the click stage rather than sitting inside the funnel.
    pub leads_generated: i64,
    pub leads_converted: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPerformance {
    pub segment_id: Uuid,
    pub segment_name: String,
    pub customer_count: i64,
    pub total_campaigns: i64,
    pub total_conversions: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentPerformanceReport {
    pub segments: Vec<SegmentPerformance>,
}
