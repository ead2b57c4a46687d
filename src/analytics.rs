//! Analytics aggregator: rolls stored campaign results up into KPIs, ROI and
//! funnel reports.
//!
//! Everything here is a pure function of rows already read from the store, so
//! any figure in a report can be recomputed from the `campaign_results` table.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::*;

/// Population counts that the overview reports alongside campaign totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulationCounts {
    pub customers: i64,
    pub active_segments: i64,
    pub leads: i64,
}

/// `numerator / denominator`, or zero when there is nothing to divide by.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// `(revenue - cost) / cost`, or zero for a campaign that cost nothing.
pub fn roi(revenue: f64, cost: f64) -> f64 {
    ratio(revenue - cost, cost)
}

impl AnalyticsFilter {
    pub fn admits(&self, result: &CampaignResult) -> bool {
        self.campaign_id.map_or(true, |id| id == result.campaign_id)
            && self.from.map_or(true, |from| result.created_at >= from)
            && self.to.map_or(true, |to| result.created_at <= to)
    }

    pub fn apply<'a>(&self, results: &'a [CampaignResult]) -> Vec<&'a CampaignResult> {
        results.iter().filter(|r| self.admits(r)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    sent: i64,
    delivered: i64,
    bounced: i64,
    impressions: i64,
    opens: i64,
    clicks: i64,
    conversions: i64,
    leads_generated: i64,
    leads_converted: i64,
    revenue: f64,
    cost: f64,
}

impl Totals {
    fn add(mut self, r: &CampaignResult) -> Self {
        self.sent += r.total_sent;
        self.delivered += r.delivered;
        self.bounced += r.bounced;
        self.impressions += r.impressions;
        self.opens += r.opens;
        self.clicks += r.clicks;
        self.conversions += r.conversions;
        self.leads_generated += r.leads_generated;
        self.leads_converted += r.leads_converted;
        self.revenue += r.revenue;
        self.cost += r.total_cost;
        self
    }

    fn of<'a>(results: impl IntoIterator<Item = &'a CampaignResult>) -> Self {
        results.into_iter().fold(Self::default(), Self::add)
    }

    fn open_rate(&self) -> f64 {
        ratio(self.opens as f64, self.delivered as f64)
    }

    fn click_rate(&self) -> f64 {
        ratio(self.clicks as f64, self.opens as f64)
    }

    fn conversion_rate(&self) -> f64 {
        ratio(self.conversions as f64, self.opens as f64)
    }

    fn roi(&self) -> f64 {
        roi(self.revenue, self.cost)
    }
}

/// Counts and derived rates for a single campaign.
pub fn campaign_stats(result: &CampaignResult) -> CampaignStats {
    let t = Totals::of([result]);
    CampaignStats {
        campaign_id: result.campaign_id,
        total_sent: t.sent,
        delivered: t.delivered,
        bounced: t.bounced,
        impressions: t.impressions,
        opens: t.opens,
        clicks: t.clicks,
        conversions: t.conversions,
        leads_generated: t.leads_generated,
        leads_converted: t.leads_converted,
        revenue: t.revenue,
        total_cost: t.cost,
        delivery_rate: ratio(t.delivered as f64, t.sent as f64),
        open_rate: t.open_rate(),
        click_rate: t.click_rate(),
        ctr: ratio(t.clicks as f64, t.delivered as f64),
        conversion_rate: t.conversion_rate(),
        roi: t.roi(),
    }
}

pub fn overview(
    campaigns: &[Campaign],
    results: &[CampaignResult],
    population: PopulationCounts,
    filter: &AnalyticsFilter,
) -> AnalyticsOverview {
    let campaigns: Vec<&Campaign> = campaigns
        .iter()
        .filter(|c| filter.campaign_id.map_or(true, |id| id == c.id))
        .collect();
    let count = |status: CampaignStatus| {
        campaigns.iter().filter(|c| c.status == status).count() as i64
    };
    let t = Totals::of(filter.apply(results));

    AnalyticsOverview {
        total_campaigns: campaigns.len() as i64,
        draft_campaigns: count(CampaignStatus::Draft),
        active_campaigns: count(CampaignStatus::Active),
        paused_campaigns: count(CampaignStatus::Paused),
        completed_campaigns: count(CampaignStatus::Completed),
        total_sent: t.sent,
        total_delivered: t.delivered,
        total_opens: t.opens,
        total_clicks: t.clicks,
        total_conversions: t.conversions,
        total_revenue: t.revenue,
        total_cost: t.cost,
        open_rate: t.open_rate(),
        click_rate: t.click_rate(),
        conversion_rate: t.conversion_rate(),
        roi: t.roi(),
        total_customers: population.customers,
        total_segments: population.active_segments,
        total_leads: population.leads,
    }
}

/// ROI per launched campaign, best first.
pub fn roi_report(
    campaigns: &[Campaign],
    results: &[CampaignResult],
    filter: &AnalyticsFilter,
) -> RoiReport {
    let by_id: HashMap<Uuid, &Campaign> = campaigns.iter().map(|c| (c.id, c)).collect();

    let mut entries: Vec<RoiEntry> = filter
        .apply(results)
        .into_iter()
        .filter_map(|r| {
            let campaign = by_id.get(&r.campaign_id)?;
            Some(RoiEntry {
                campaign_id: campaign.id,
                campaign_name: campaign.name.clone(),
                campaign_type: campaign.campaign_type,
                status: campaign.status,
                revenue: r.revenue,
                cost: r.total_cost,
                roi: roi(r.revenue, r.total_cost),
                conversions: r.conversions,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.roi.total_cmp(&a.roi));
    RoiReport { campaigns: entries }
}

pub fn funnel(results: &[CampaignResult], filter: &AnalyticsFilter) -> FunnelReport {
    let t = Totals::of(filter.apply(results));
    let counts = [
        ("Sent", t.sent),
        ("Delivered", t.delivered),
        ("Opened", t.opens),
        ("Clicked", t.clicks),
        ("Converted", t.conversions),
    ];

    let mut previous = t.sent;
    let stages = counts
        .into_iter()
        .map(|(name, count)| {
            let drop_off = (previous - count).max(0);
            let stage = FunnelStage {
                name: name.to_string(),
                count,
                share_of_sent: ratio(count as f64, t.sent as f64),
                drop_off,
                drop_off_rate: ratio(drop_off as f64, previous as f64),
            };
            previous = count;
            stage
        })
        .collect();

    FunnelReport {
        stages,
        leads_generated: t.leads_generated,
        leads_converted: t.leads_converted,
    }
}

/// Conversions and revenue per active segment, highest revenue first.
pub fn segment_performance(
    segments: &[Segment],
    campaigns: &[Campaign],
    results: &[CampaignResult],
    filter: &AnalyticsFilter,
) -> SegmentPerformanceReport {
    let results: HashMap<Uuid, &CampaignResult> = filter
        .apply(results)
        .into_iter()
        .map(|r| (r.campaign_id, r))
        .collect();

    let mut rows: Vec<SegmentPerformance> = segments
        .iter()
        .filter(|s| s.is_active)
        .map(|segment| {
            let targeting: Vec<&Campaign> = campaigns
                .iter()
                .filter(|c| c.segment_id == segment.id)
                .collect();
            let t = Totals::of(targeting.iter().filter_map(|c| results.get(&c.id).copied()));
            SegmentPerformance {
                segment_id: segment.id,
                segment_name: segment.name.clone(),
                customer_count: segment.customer_count,
                total_campaigns: targeting.len() as i64,
                total_conversions: t.conversions,
                total_revenue: t.revenue,
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total_revenue.total_cmp(&a.total_revenue));
    SegmentPerformanceReport { segments: rows }
}
