//! Campaign metrics generator.
//!
//! No messages are actually sent. When a campaign launches, its funnel
//! (sent → delivered → opened → clicked → converted) is derived from the size
//! of the target segment and a set of stage ratios. Ratios are either fixed or
//! sampled per launch from channel-specific ranges.

use std::ops::Range;

use chrono::Utc;
use rand::Rng;

use crate::models::{Campaign, CampaignResult, CampaignType};

/// Share of the campaign budget charged on top of per-send costs.
const BUDGET_SPEND_SHARE: f64 = 0.5;

/// Conversion ratios between funnel stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelRatios {
    /// delivered / sent
    pub delivery: f64,
    /// opens / delivered for email and SMS, opens / impressions for social.
    pub open: f64,
    /// clicks / opens, or clicks / impressions for ads.
    pub click: f64,
    /// conversions / clicks
    pub conversion: f64,
    /// leads generated / clicks
    pub lead: f64,
    /// leads converted / leads generated
    pub lead_conversion: f64,
    /// Impressions per recipient for social and ads.
    pub impressions_per_recipient: i64,
    pub avg_order_value: f64,
}

struct RatioRanges {
    open: Range<f64>,
    click: Range<f64>,
    impressions: Range<i64>,
}

impl RatioRanges {
    fn for_channel(channel: CampaignType) -> Self {
        match channel {
            CampaignType::Email | CampaignType::Sms => Self {
                open: 0.15..0.35,
                click: 0.10..0.25,
                impressions: 0..1,
            },
            CampaignType::Social => Self {
                open: 0.02..0.08,
                click: 0.20..0.40,
                impressions: 2..6,
            },
            CampaignType::Ads => Self {
                open: 0.0..0.0,
                click: 0.01..0.05,
                impressions: 5..16,
            },
        }
    }
}

const DELIVERY: Range<f64> = 0.92..0.98;
const CONVERSION: Range<f64> = 0.05..0.20;
const LEAD: Range<f64> = 0.10..0.30;
const LEAD_CONVERSION: Range<f64> = 0.20..0.40;
const ORDER_VALUE: Range<f64> = 50.0..200.0;

impl FunnelRatios {
    /// Midpoints of the sampling ranges for `channel`.
    pub fn typical(channel: CampaignType) -> Self {
        let ranges = RatioRanges::for_channel(channel);
        Self {
            delivery: midpoint(&DELIVERY),
            open: midpoint(&ranges.open),
            click: midpoint(&ranges.click),
            conversion: midpoint(&CONVERSION),
            lead: midpoint(&LEAD),
            lead_conversion: midpoint(&LEAD_CONVERSION),
            impressions_per_recipient: (ranges.impressions.start + ranges.impressions.end - 1) / 2,
            avg_order_value: midpoint(&ORDER_VALUE),
        }
    }

    /// Draw one set of ratios for `channel`.
    pub fn sample<R: Rng + ?Sized>(channel: CampaignType, rng: &mut R) -> Self {
        let ranges = RatioRanges::for_channel(channel);
        Self {
            delivery: sample_f64(rng, &DELIVERY),
            open: sample_f64(rng, &ranges.open),
            click: sample_f64(rng, &ranges.click),
            conversion: sample_f64(rng, &CONVERSION),
            lead: sample_f64(rng, &LEAD),
            lead_conversion: sample_f64(rng, &LEAD_CONVERSION),
            impressions_per_recipient: if ranges.impressions.is_empty() {
                0
            } else {
                rng.gen_range(ranges.impressions)
            },
            avg_order_value: sample_f64(rng, &ORDER_VALUE),
        }
    }
}

fn midpoint(range: &Range<f64>) -> f64 {
    (range.start + range.end) / 2.0
}

fn sample_f64<R: Rng + ?Sized>(rng: &mut R, range: &Range<f64>) -> f64 {
    if range.is_empty() {
        range.start
    } else {
        rng.gen_range(range.clone())
    }
}

/// Where launch-time ratios come from.
#[derive(Debug, Clone, PartialEq)]
pub enum FunnelModel {
    /// Sampled per launch from channel-specific ranges.
    Randomized,
    /// Range midpoints for the campaign's channel.
    Typical,
    /// The same ratios for every channel.
    Fixed(FunnelRatios),
}

#[derive(Debug, Clone)]
pub struct Simulator {
    model: FunnelModel,
}

impl Default for Simulator {
    fn default() -> Self {
        Self::randomized()
    }
}

impl Simulator {
    pub fn new(model: FunnelModel) -> Self {
        Self { model }
    }

    pub fn randomized() -> Self {
        Self::new(FunnelModel::Randomized)
    }

    pub fn typical() -> Self {
        Self::new(FunnelModel::Typical)
    }

    pub fn fixed(ratios: FunnelRatios) -> Self {
        Self::new(FunnelModel::Fixed(ratios))
    }

    pub fn model(&self) -> &FunnelModel {
        &self.model
    }

    pub fn ratios_for(&self, channel: CampaignType) -> FunnelRatios {
        match &self.model {
            FunnelModel::Randomized => FunnelRatios::sample(channel, &mut rand::thread_rng()),
            FunnelModel::Typical => FunnelRatios::typical(channel),
            FunnelModel::Fixed(ratios) => ratios.clone(),
        }
    }

    /// Produce the result row for `campaign` launched at a segment of
    /// `audience` customers.
    pub fn simulate(&self, campaign: &Campaign, audience: i64) -> CampaignResult {
        let ratios = self.ratios_for(campaign.campaign_type);
        generate(campaign, audience, &ratios)
    }
}

/// Apply `ratios` to an audience. Pure arithmetic: the same inputs always give
/// the same counts.
pub fn generate(campaign: &Campaign, audience: i64, ratios: &FunnelRatios) -> CampaignResult {
    let total_sent = audience.max(0);
    let delivered = floor_share(total_sent, ratios.delivery);
    let bounced = total_sent - delivered;
    let reach = total_sent * ratios.impressions_per_recipient.max(0);

    let (impressions, opens, clicks) = match campaign.campaign_type {
        CampaignType::Email | CampaignType::Sms => {
            let opens = floor_share(delivered, ratios.open);
            (0, opens, floor_share(opens, ratios.click))
        }
        CampaignType::Social => {
            let opens = floor_share(reach, ratios.open);
            (reach, opens, floor_share(opens, ratios.click))
        }
        CampaignType::Ads => {
            let clicks = floor_share(reach, ratios.click);
            (reach, clicks, clicks)
        }
    };

    let conversions = ceil_share(clicks, ratios.conversion);
    let leads_generated = ceil_share(clicks, ratios.lead);
    let leads_converted = ceil_share(leads_generated, ratios.lead_conversion);

    let revenue = conversions as f64 * ratios.avg_order_value.max(0.0);
    let total_cost =
        total_sent as f64 * campaign.cost_per_send + campaign.budget * BUDGET_SPEND_SHARE;

    CampaignResult {
        campaign_id: campaign.id,
        total_sent,
        delivered,
        bounced,
        impressions,
        opens,
        clicks,
        conversions,
        leads_generated,
        leads_converted,
        revenue,
        total_cost,
        created_at: Utc::now(),
    }
}

fn floor_share(count: i64, ratio: f64) -> i64 {
    (count as f64 * ratio.clamp(0.0, 1.0)).floor() as i64
}

fn ceil_share(count: i64, ratio: f64) -> i64 {
    (count as f64 * ratio.clamp(0.0, 1.0)).ceil() as i64
}
