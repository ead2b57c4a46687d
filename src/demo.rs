//! Sample data for a fresh install: an admin account, 50 customers, four
//! segments and three campaigns, two of them already launched.

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{Batch, Database};
use crate::error::Result;
use crate::models::*;
use crate::rules::{Criteria, Operator, Rule};
use crate::simulation::Simulator;

pub const DEMO_USERNAME: &str = "admin";
pub const DEMO_PASSWORD: &str = "admin123";
pub const DEMO_CUSTOMER_COUNT: usize = 50;

const FIRST_NAMES: &[&str] = &[
    "John", "Jane", "Michael", "Sarah", "David", "Emily", "Chris", "Lisa", "Robert", "Amanda",
    "James", "Jennifer", "William", "Jessica", "Daniel",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Anderson", "Taylor", "Thomas", "Moore",
];
const LOCATIONS: &[&str] = &[
    "New York",
    "Los Angeles",
    "Chicago",
    "Houston",
    "Phoenix",
    "Philadelphia",
    "San Antonio",
    "San Diego",
    "Dallas",
    "San Jose",
];
const COUNTRIES: &[&str] = &["US", "US", "US", "CA", "GB"];
const LEAD_SOURCES: &[&str] = &[
    "Website",
    "Social Media",
    "Referral",
    "Email Campaign",
    "Google Ads",
    "Trade Show",
];
// Weighted towards paying customers
const STATUSES: &[CustomerStatus] = &[
    CustomerStatus::Lead,
    CustomerStatus::Prospect,
    CustomerStatus::Customer,
    CustomerStatus::Customer,
    CustomerStatus::Customer,
];

/// What a demo initialization created. All zero when data already existed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoSummary {
    pub initialized: bool,
    pub customers: usize,
    pub segments: usize,
    pub campaigns: usize,
    pub launched: usize,
}

/// Seed the store if it holds no customers yet.
///
/// The emptiness check and every insert share one write transaction: a
/// failure leaves the store untouched, and concurrent callers seed it once.
pub fn initialize_demo_data(db: &Database, simulator: &Simulator) -> Result<DemoSummary> {
    seed_with(db, simulator, &mut rand::thread_rng())
}

pub fn seed_with<R: Rng + ?Sized>(
    db: &Database,
    simulator: &Simulator,
    rng: &mut R,
) -> Result<DemoSummary> {
    let summary = db.batch(|store| seed_in(store, simulator, rng))?;
    if summary.initialized {
        tracing::info!(
            customers = summary.customers,
            segments = summary.segments,
            "Demo data initialized"
        );
    } else {
        tracing::info!("Demo data already present, skipping");
    }
    Ok(summary)
}

fn seed_in<R: Rng + ?Sized>(
    db: &Batch<'_>,
    simulator: &Simulator,
    rng: &mut R,
) -> Result<DemoSummary> {
    if db.population_counts()?.customers > 0 {
        return Ok(DemoSummary::default());
    }

    if db.get_user_credentials(DEMO_USERNAME)?.is_none() {
        db.create_user(CreateUserInput {
            username: DEMO_USERNAME.to_string(),
            password: DEMO_PASSWORD.to_string(),
            email: Some("admin@example.com".to_string()),
            role: Some(Role::Admin),
        })?;
    }

    for i in 0..DEMO_CUSTOMER_COUNT {
        db.create_customer(sample_customer(i, rng))?;
    }

    let segments = demo_segments()
        .into_iter()
        .map(|input| db.create_segment(input))
        .collect::<Result<Vec<_>>>()?;

    let summer = db.create_campaign(CreateCampaignInput {
        name: "Summer Sale 2024".to_string(),
        segment_id: segments[0].id,
        campaign_type: Some(CampaignType::Email),
        subject: Some("Exclusive Summer Deals Just for You!".to_string()),
        content: Some(
            "Dear valued customer, enjoy 20% off on all products this summer!".to_string(),
        ),
        schedule_time: None,
        budget: Some(500.0),
        cost_per_send: None,
        description: Some("Annual summer promotion targeting high-value customers".to_string()),
        workflow_steps: None,
    })?;
    let launch = db.create_campaign(CreateCampaignInput {
        name: "Product Launch - Social".to_string(),
        segment_id: segments[1].id,
        campaign_type: Some(CampaignType::Social),
        subject: None,
        content: Some("Introducing our revolutionary new product line! #NewArrivals".to_string()),
        schedule_time: None,
        budget: Some(1000.0),
        cost_per_send: None,
        description: Some("Social media campaign for new product launch".to_string()),
        workflow_steps: None,
    })?;
    db.create_campaign(CreateCampaignInput {
        name: "Re-engagement Campaign".to_string(),
        segment_id: segments[2].id,
        campaign_type: Some(CampaignType::Email),
        subject: Some("We miss you! Come back for a special offer".to_string()),
        content: Some("Hi there! It's been a while. Here's 15% off your next order.".to_string()),
        schedule_time: None,
        budget: Some(300.0),
        cost_per_send: None,
        description: Some("Win-back campaign for engaged but inactive users".to_string()),
        workflow_steps: Some(vec![
            json!({ "step": 1, "action": "send_email", "delay_days": 0 }),
            json!({ "step": 2, "action": "send_reminder", "delay_days": 3 }),
        ]),
    })?;

    db.launch_campaign(summer.id, simulator)?;
    db.complete_campaign(summer.id)?;
    db.launch_campaign(launch.id, simulator)?;

    Ok(DemoSummary {
        initialized: true,
        customers: DEMO_CUSTOMER_COUNT,
        segments: segments.len(),
        campaigns: 3,
        launched: 2,
    })
}

fn demo_segments() -> Vec<CreateSegmentInput> {
    let segment = |name: &str, description: &str, rule: Rule, segment_type| CreateSegmentInput {
        name: name.to_string(),
        description: Some(description.to_string()),
        criteria: Some(Criteria::Tree(rule)),
        segment_type: Some(segment_type),
    };

    vec![
        segment(
            "High Value Customers",
            "Customers who have spent more than $1000",
            Rule::predicate("total_spent", Operator::Gt, 1000),
            SegmentType::Purchase,
        ),
        segment(
            "Young Professionals",
            "Customers aged 25-40",
            Rule::and(vec![
                Rule::predicate("demographics.age", Operator::Gte, 25),
                Rule::predicate("demographics.age", Operator::Lte, 40),
            ]),
            SegmentType::Demographic,
        ),
        segment(
            "Engaged Users",
            "Highly engaged customers",
            Rule::predicate("engagement_score", Operator::Gte, 70),
            SegmentType::Behavioral,
        ),
        segment(
            "New Leads",
            "Recently acquired leads",
            Rule::predicate("status", Operator::Eq, "lead"),
            SegmentType::Manual,
        ),
    ]
}

fn pick<'a, T, R: Rng + ?Sized>(items: &'a [T], rng: &mut R) -> &'a T {
    // Callers only pass the non-empty constant tables above
    &items[rng.gen_range(0..items.len())]
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn sample_customer<R: Rng + ?Sized>(i: usize, rng: &mut R) -> CreateCustomerInput {
    let first = pick(FIRST_NAMES, rng);
    let last = pick(LAST_NAMES, rng);

    let mut demographics = Attributes::new();
    demographics.insert("age".into(), json!(rng.gen_range(22..=65)));
    demographics.insert("gender".into(), json!(pick(&["male", "female"], rng)));
    demographics.insert("location".into(), json!(pick(LOCATIONS, rng)));
    demographics.insert("country".into(), json!(pick(COUNTRIES, rng)));
    demographics.insert(
        "income_bracket".into(),
        json!(pick(&["low", "medium", "high"], rng)),
    );

    let mut behavioral = Attributes::new();
    behavioral.insert("website_visits".into(), json!(rng.gen_range(1..=50)));
    behavioral.insert("email_opens".into(), json!(rng.gen_range(0..=20)));
    behavioral.insert("last_activity_days".into(), json!(rng.gen_range(1..=90)));

    let purchase_date = NaiveDate::from_ymd_opt(2024, 1, 15);
    let purchases = (0..rng.gen_range(0..=5))
        .map(|j| Purchase {
            product: format!("Product {}", j),
            amount: round2(rng.gen_range(10.0..200.0)),
            date: purchase_date,
        })
        .collect();

    let total_spent = if rng.gen_bool(0.7) {
        round2(rng.gen_range(0.0..5000.0))
    } else {
        0.0
    };

    CreateCustomerInput {
        name: format!("{} {}", first, last),
        email: format!("{}.{}{}@example.com", first.to_lowercase(), last.to_lowercase(), i),
        phone: Some(format!(
            "+1-555-{}-{}",
            rng.gen_range(100..=999),
            rng.gen_range(1000..=9999)
        )),
        demographics: Some(demographics),
        behavioral_data: Some(behavioral),
        purchase_history: Some(purchases),
        total_spent: Some(total_spent),
        lifetime_value: Some(round2(total_spent * rng.gen_range(1.2..2.5))),
        engagement_score: Some(rng.gen_range(10..=100)),
        status: Some(*pick(STATUSES, rng)),
        lead_source: Some(pick(LEAD_SOURCES, rng).to_string()),
    }
}
