use axum::extract::State;

use crate::analytics;
use crate::api::extract::{Json, Query};
use crate::db::Database;
use crate::error::Result;
use crate::models::*;

pub async fn overview(
    State(db): State<Database>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<Json<AnalyticsOverview>> {
    let campaigns = db.list_campaigns(&ListCampaignsQuery::default())?;
    let results = db.list_campaign_results()?;
    let population = db.population_counts()?;
    Ok(Json(analytics::overview(
        &campaigns,
        &results,
        population,
        &filter,
    )))
}

pub async fn roi(
    State(db): State<Database>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<Json<RoiReport>> {
    let campaigns = db.list_campaigns(&ListCampaignsQuery::default())?;
    let results = db.list_campaign_results()?;
    Ok(Json(analytics::roi_report(&campaigns, &results, &filter)))
}

pub async fn funnel(
    State(db): State<Database>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<Json<FunnelReport>> {
    let results = db.list_campaign_results()?;
    Ok(Json(analytics::funnel(&results, &filter)))
}

pub async fn segments(
    State(db): State<Database>,
    Query(filter): Query<AnalyticsFilter>,
) -> Result<Json<SegmentPerformanceReport>> {
    let segments = db.list_segments()?;
    let campaigns = db.list_campaigns(&ListCampaignsQuery::default())?;
    let results = db.list_campaign_results()?;
    Ok(Json(analytics::segment_performance(
        &segments, &campaigns, &results, &filter,
    )))
}
