//! Domain models for the marketing service.
//!
//! # Core Concepts
//!
//! - [`Customer`]: The single source of truth for a person's profile, purchases
//!   and engagement. Segment rules are evaluated against it.
//! - [`Segment`]: A named rule over customers with a cached membership count.
//! - [`Campaign`]: A push to one segment over one channel, moving through
//!   draft → active → paused/completed.
//! - [`CampaignResult`]: Simulated funnel figures recorded once, at launch.
//! - [`User`]: An operator account used to obtain a session token.
//!
//! Analytics report shapes such as [`AnalyticsOverview`] are derived from stored
//! results, never stored themselves.

mod analytics;
mod campaign;
mod customer;
mod segment;
mod user;

pub use analytics::*;
pub use campaign::*;
pub use customer::*;
pub use segment::*;
pub use user::*;
