use crm_marketing::db::Database;
use crm_marketing::error::Error;
use crm_marketing::models::*;
use crm_marketing::rules::{Criteria, Operator, Rule};
use crm_marketing::simulation::{FunnelRatios, Simulator};
use serde_json::json;
use speculate2::speculate;
use uuid::Uuid;

fn attributes(value: serde_json::Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}

fn add_customer(db: &Database, email: &str, country: Option<&str>, ltv: f64) -> Customer {
    let demographics = match country {
        Some(country) => json!({ "country": country, "age": 30 }),
        None => json!({ "age": 30 }),
    };
    db.create_customer(CreateCustomerInput {
        name: email.split('@').next().unwrap_or(email).to_string(),
        email: email.to_string(),
        demographics: Some(attributes(demographics)),
        lifetime_value: Some(ltv),
        ..Default::default()
    })
    .expect("Failed to create customer")
}

/// Five customers, two of which are in the US with a lifetime value over 100.
fn seed_country_fixture(db: &Database) {
    add_customer(db, "ann@example.com", Some("US"), 150.0);
    add_customer(db, "bob@example.com", Some("US"), 100.0);
    add_customer(db, "cara@example.com", Some("CA"), 500.0);
    add_customer(db, "dan@example.com", Some("US"), 1000.0);
    add_customer(db, "eve@example.com", None, 300.0);
}

fn us_high_value_rule() -> Rule {
    Rule::and(vec![
        Rule::predicate("country", Operator::Eq, "US"),
        Rule::predicate("ltv", Operator::Gt, 100),
    ])
}

fn create_segment(db: &Database, name: &str, rule: Rule) -> Segment {
    db.create_segment(CreateSegmentInput {
        name: name.to_string(),
        description: None,
        criteria: Some(Criteria::Tree(rule)),
        segment_type: None,
    })
    .expect("Failed to create segment")
}

fn create_campaign(db: &Database, segment_id: Uuid, campaign_type: CampaignType) -> Campaign {
    db.create_campaign(CreateCampaignInput {
        name: "Spring Push".to_string(),
        segment_id,
        campaign_type: Some(campaign_type),
        subject: Some("Spring is here".to_string()),
        content: None,
        schedule_time: None,
        budget: Some(100.0),
        cost_per_send: Some(1.0),
        description: None,
        workflow_steps: None,
    })
    .expect("Failed to create campaign")
}

fn halves() -> Simulator {
    Simulator::fixed(FunnelRatios {
        delivery: 0.5,
        open: 0.5,
        click: 0.5,
        conversion: 0.5,
        lead: 0.5,
        lead_conversion: 0.5,
        impressions_per_recipient: 2,
        avg_order_value: 40.0,
    })
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "customers" {
        it "creates a customer with defaults" {
            let customer = db.create_customer(CreateCustomerInput {
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string(),
                ..Default::default()
            }).expect("Failed to create");

            assert_eq!(customer.status, CustomerStatus::Lead);
            assert_eq!(customer.engagement_score, 0);
            assert!(customer.demographics.is_empty());

            let found = db.get_customer(customer.id).expect("Query failed").unwrap();
            assert_eq!(found.email, "jane@example.com");
        }

        it "rejects a duplicate email" {
            add_customer(&db, "dup@example.com", None, 0.0);
            let err = db.create_customer(CreateCustomerInput {
                name: "Other".to_string(),
                email: "DUP@example.com".to_string(),
                ..Default::default()
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "rejects an out of range engagement score" {
            let err = db.create_customer(CreateCustomerInput {
                name: "Too Keen".to_string(),
                email: "keen@example.com".to_string(),
                engagement_score: Some(101),
                ..Default::default()
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "round-trips json attributes and purchases" {
            let customer = db.create_customer(CreateCustomerInput {
                name: "Buyer".to_string(),
                email: "buyer@example.com".to_string(),
                behavioral_data: Some(attributes(json!({ "website_visits": 12 }))),
                purchase_history: Some(vec![Purchase {
                    product: "Widget".to_string(),
                    amount: 25.5,
                    date: None,
                }]),
                ..Default::default()
            }).expect("Failed to create");

            let found = db.get_customer(customer.id).expect("Query failed").unwrap();
            assert_eq!(found.behavioral_data["website_visits"], 12);
            assert_eq!(found.purchase_history.len(), 1);
            assert_eq!(found.purchase_history[0].amount, 25.5);
        }

        it "partially updates a customer" {
            let customer = add_customer(&db, "up@example.com", Some("US"), 10.0);
            let updated = db.update_customer(customer.id, UpdateCustomerInput {
                status: Some(CustomerStatus::Customer),
                ..Default::default()
            }).expect("Update failed").unwrap();

            assert_eq!(updated.status, CustomerStatus::Customer);
            assert_eq!(updated.email, "up@example.com");
            assert_eq!(updated.lifetime_value, 10.0);
        }

        it "clears optional text sent as an empty string" {
            let customer = db.create_customer(CreateCustomerInput {
                name: "Tel".to_string(),
                email: "tel@example.com".to_string(),
                phone: Some("+1-555-100-2000".to_string()),
                lead_source: Some("Referral".to_string()),
                ..Default::default()
            }).expect("Failed to create customer");

            let updated = db.update_customer(customer.id, UpdateCustomerInput {
                phone: Some(String::new()),
                ..Default::default()
            }).expect("Update failed").unwrap();

            assert_eq!(updated.phone, None);
            assert_eq!(updated.lead_source.as_deref(), Some("Referral"));
            let stored = db.get_customer(customer.id).expect("Query failed").unwrap();
            assert_eq!(stored.phone, None);
        }

        it "returns None when updating an unknown customer" {
            let result = db.update_customer(Uuid::new_v4(), UpdateCustomerInput::default())
                .expect("Update failed");
            assert!(result.is_none());
        }

        it "deletes a customer" {
            let customer = add_customer(&db, "gone@example.com", None, 0.0);
            assert!(db.delete_customer(customer.id).expect("Delete failed"));
            assert!(!db.delete_customer(customer.id).expect("Delete failed"));
        }

        it "pages and searches customers" {
            seed_country_fixture(&db);

            let page = db.list_customers(&ListCustomersQuery {
                page: Some(2),
                per_page: Some(2),
                ..Default::default()
            }).expect("Query failed");
            assert_eq!(page.total, 5);
            assert_eq!(page.pages, 3);
            assert_eq!(page.current_page, 2);
            assert_eq!(page.customers.len(), 2);

            let found = db.list_customers(&ListCustomersQuery {
                search: Some("CARA".to_string()),
                ..Default::default()
            }).expect("Query failed");
            assert_eq!(found.total, 1);
            assert_eq!(found.customers[0].email, "cara@example.com");
        }
    }

    describe "segments" {
        it "counts country=US AND ltv>100 exactly" {
            seed_country_fixture(&db);
            let segment = create_segment(&db, "US high value", us_high_value_rule());

            assert_eq!(segment.customer_count, 2);
            assert!(segment.last_refreshed_at.is_some());
        }

        it "accepts the flat rules/match form" {
            seed_country_fixture(&db);
            let criteria: Criteria = serde_json::from_value(json!({
                "rules": [
                    { "field": "demographics.country", "operator": "eq", "value": "CA" },
                    { "field": "lifetime_value", "operator": "gte", "value": 1000 }
                ],
                "match": "any"
            })).expect("Invalid criteria");

            let segment = db.create_segment(CreateSegmentInput {
                name: "Canada or whales".to_string(),
                description: None,
                criteria: Some(criteria),
                segment_type: Some(SegmentType::Demographic),
            }).expect("Failed to create segment");

            assert_eq!(segment.customer_count, 2);
        }

        it "keeps the cached count until refreshed" {
            let segment = create_segment(&db, "US high value", us_high_value_rule());
            assert_eq!(segment.customer_count, 0);

            seed_country_fixture(&db);
            let cached = db.get_segment(segment.id).expect("Query failed").unwrap();
            assert_eq!(cached.customer_count, 0);

            let refreshed = db.refresh_segment(segment.id).expect("Refresh failed");
            assert_eq!(refreshed.customer_count, 2);
            assert!(refreshed.last_refreshed_at >= cached.last_refreshed_at);
        }

        it "fails to refresh an unknown segment" {
            let err = db.refresh_segment(Uuid::new_v4()).unwrap_err();
            assert!(matches!(err, Error::NotFound("Segment")));
        }

        it "recounts when the rule changes" {
            seed_country_fixture(&db);
            let segment = create_segment(&db, "US high value", us_high_value_rule());

            let updated = db.update_segment(segment.id, UpdateSegmentInput {
                criteria: Some(Criteria::Tree(Rule::predicate("country", Operator::Eq, "US"))),
                ..Default::default()
            }).expect("Update failed").unwrap();

            assert_eq!(updated.customer_count, 3);
        }

        it "rejects malformed rules" {
            let err = db.create_segment(CreateSegmentInput {
                name: "Broken".to_string(),
                description: None,
                criteria: Some(Criteria::Tree(Rule::predicate("age", Operator::Gt, "old"))),
                segment_type: None,
            }).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "clears the description sent as an empty string" {
            let segment = db.create_segment(CreateSegmentInput {
                name: "Described".to_string(),
                description: Some("Everyone".to_string()),
                criteria: None,
                segment_type: None,
            }).expect("Failed to create segment");

            let updated = db.update_segment(segment.id, UpdateSegmentInput {
                description: Some(String::new()),
                ..Default::default()
            }).expect("Update failed").unwrap();
            assert_eq!(updated.description, None);
        }

        it "lists matching members" {
            seed_country_fixture(&db);
            let segment = create_segment(&db, "US high value", us_high_value_rule());

            let members = db.get_segment_members(segment.id).expect("Query failed");
            assert_eq!(members.count, 2);
            let mut emails: Vec<&str> = members.customers.iter().map(|c| c.email.as_str()).collect();
            emails.sort();
            assert_eq!(emails, vec!["ann@example.com", "dan@example.com"]);
        }

        it "lists only active segments" {
            let kept = create_segment(&db, "Kept", Rule::all());
            let hidden = create_segment(&db, "Hidden", Rule::all());
            db.update_segment(hidden.id, UpdateSegmentInput {
                is_active: Some(false),
                ..Default::default()
            }).expect("Update failed");

            let segments = db.list_segments().expect("Query failed");
            assert_eq!(segments.len(), 1);
            assert_eq!(segments[0].id, kept.id);
        }

        it "refuses to delete a segment that campaigns target" {
            let segment = create_segment(&db, "Targeted", Rule::all());
            create_campaign(&db, segment.id, CampaignType::Email);

            let err = db.delete_segment(segment.id).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    describe "campaigns" {
        it "creates drafts with the default cost per send" {
            let segment = create_segment(&db, "All", Rule::all());
            let campaign = db.create_campaign(CreateCampaignInput {
                name: "Plain".to_string(),
                segment_id: segment.id,
                campaign_type: None,
                subject: None,
                content: None,
                schedule_time: None,
                budget: None,
                cost_per_send: None,
                description: None,
                workflow_steps: None,
            }).expect("Failed to create campaign");

            assert_eq!(campaign.status, CampaignStatus::Draft);
            assert_eq!(campaign.campaign_type, CampaignType::Email);
            assert_eq!(campaign.cost_per_send, DEFAULT_COST_PER_SEND);
        }

        it "rejects an unknown segment" {
            let err = db.create_campaign(CreateCampaignInput {
                name: "Nowhere".to_string(),
                segment_id: Uuid::new_v4(),
                campaign_type: None,
                subject: None,
                content: None,
                schedule_time: None,
                budget: None,
                cost_per_send: None,
                description: None,
                workflow_steps: None,
            }).unwrap_err();
            assert!(matches!(err, Error::NotFound("Segment")));
        }

        it "launches exactly once and records one result" {
            seed_country_fixture(&db);
            let segment = create_segment(&db, "US high value", us_high_value_rule());
            let campaign = create_campaign(&db, segment.id, CampaignType::Email);

            let launch = db.launch_campaign(campaign.id, &halves()).expect("Launch failed");
            assert_eq!(launch.campaign.status, CampaignStatus::Active);
            assert!(launch.campaign.start_date.is_some());
            assert_eq!(launch.result.total_sent, 2);
            assert_eq!(launch.result.delivered, 1);
            assert_eq!(launch.result.total_cost, 2.0 * 1.0 + 100.0 * 0.5);

            let again = db.launch_campaign(campaign.id, &halves()).unwrap_err();
            assert!(matches!(again, Error::Validation(_)));

            let results = db.list_campaign_results().expect("Query failed");
            assert_eq!(results.len(), 1);
            assert_eq!(results[0], launch.result);

            let stored = db.get_campaign(campaign.id).expect("Query failed").unwrap();
            assert_eq!(stored.status, CampaignStatus::Active);
        }

        it "fails to launch an unknown campaign" {
            let err = db.launch_campaign(Uuid::new_v4(), &halves()).unwrap_err();
            assert!(matches!(err, Error::NotFound("Campaign")));
        }

        it "moves through pause, resume and complete" {
            let segment = create_segment(&db, "All", Rule::all());
            let campaign = create_campaign(&db, segment.id, CampaignType::Sms);

            let err = db.pause_campaign(campaign.id).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));

            db.launch_campaign(campaign.id, &halves()).expect("Launch failed");
            let paused = db.pause_campaign(campaign.id).expect("Pause failed");
            assert_eq!(paused.status, CampaignStatus::Paused);

            let resumed = db.resume_campaign(campaign.id).expect("Resume failed");
            assert_eq!(resumed.status, CampaignStatus::Active);

            let completed = db.complete_campaign(campaign.id).expect("Complete failed");
            assert_eq!(completed.status, CampaignStatus::Completed);
            assert!(completed.end_date.is_some());

            let err = db.resume_campaign(campaign.id).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "updates content without touching status" {
            let segment = create_segment(&db, "All", Rule::all());
            let campaign = create_campaign(&db, segment.id, CampaignType::Email);

            let updated = db.update_campaign(campaign.id, UpdateCampaignInput {
                subject: Some("New subject".to_string()),
                budget: Some(250.0),
                ..Default::default()
            }).expect("Update failed").unwrap();

            assert_eq!(updated.subject.as_deref(), Some("New subject"));
            assert_eq!(updated.budget, 250.0);
            assert_eq!(updated.status, CampaignStatus::Draft);
        }

        it "clears the subject sent as an empty string" {
            let segment = create_segment(&db, "All", Rule::all());
            let campaign = create_campaign(&db, segment.id, CampaignType::Email);

            let updated = db.update_campaign(campaign.id, UpdateCampaignInput {
                subject: Some("  ".to_string()),
                content: Some("Body".to_string()),
                ..Default::default()
            }).expect("Update failed").unwrap();
            assert_eq!(updated.subject, None);
            assert_eq!(updated.content.as_deref(), Some("Body"));

            let kept = db.update_campaign(campaign.id, UpdateCampaignInput {
                budget: Some(10.0),
                ..Default::default()
            }).expect("Update failed").unwrap();
            assert_eq!(kept.subject, None);
            assert_eq!(kept.content.as_deref(), Some("Body"));
        }

        it "filters campaigns by status" {
            let segment = create_segment(&db, "All", Rule::all());
            let first = create_campaign(&db, segment.id, CampaignType::Email);
            create_campaign(&db, segment.id, CampaignType::Social);
            db.launch_campaign(first.id, &halves()).expect("Launch failed");

            let active = db.list_campaigns(&ListCampaignsQuery {
                status: Some(CampaignStatus::Active),
            }).expect("Query failed");
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].id, first.id);

            let all = db.list_campaigns(&ListCampaignsQuery::default()).expect("Query failed");
            assert_eq!(all.len(), 2);
        }
    }

    describe "batches" {
        it "rolls back every write when one fails" {
            let result = db.batch(|store| {
                store.create_customer(CreateCustomerInput {
                    name: "First".to_string(),
                    email: "twice@example.com".to_string(),
                    ..Default::default()
                })?;
                store.create_customer(CreateCustomerInput {
                    name: "Second".to_string(),
                    email: "twice@example.com".to_string(),
                    ..Default::default()
                })
            });

            assert!(matches!(result, Err(Error::Validation(_))));
            assert_eq!(db.population_counts().expect("Query failed").customers, 0);
        }

        it "commits writes made together" {
            let campaign = db.batch(|store| {
                let segment = store.create_segment(CreateSegmentInput {
                    name: "All".to_string(),
                    description: None,
                    criteria: None,
                    segment_type: None,
                })?;
                store.create_campaign(CreateCampaignInput {
                    name: "Together".to_string(),
                    segment_id: segment.id,
                    campaign_type: None,
                    subject: None,
                    content: None,
                    schedule_time: None,
                    budget: None,
                    cost_per_send: None,
                    description: None,
                    workflow_steps: None,
                })
            }).expect("Batch failed");

            let stored = db.get_campaign(campaign.id).expect("Query failed").unwrap();
            assert_eq!(stored.name, "Together");
            assert_eq!(db.list_segments().expect("Query failed").len(), 1);
        }
    }

    describe "file storage" {
        it "keeps data across reopen" {
            let dir = tempfile::tempdir().expect("Failed to create temp dir");
            let path = dir.path().join("crm.db");

            let file_db = Database::open(path.clone()).expect("Failed to open database");
            file_db.migrate().expect("Failed to run migrations");
            seed_country_fixture(&file_db);
            let segment = create_segment(&file_db, "US high value", us_high_value_rule());
            drop(file_db);

            let reopened = Database::open(path).expect("Failed to reopen database");
            reopened.migrate().expect("Failed to run migrations");
            let found = reopened.get_segment(segment.id).expect("Query failed").unwrap();
            assert_eq!(found.customer_count, 2);
            assert_eq!(found.criteria, us_high_value_rule());
        }
    }

    describe "users" {
        it "rejects a taken username" {
            let input = CreateUserInput {
                username: "ops".to_string(),
                password: "secret123".to_string(),
                email: None,
                role: None,
            };
            let user = db.create_user(input.clone()).expect("Failed to create user");
            assert_eq!(user.role, Role::Marketer);

            let err = db.create_user(input).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }

        it "never stores the plain password" {
            db.create_user(CreateUserInput {
                username: "ops".to_string(),
                password: "secret123".to_string(),
                email: None,
                role: None,
            }).expect("Failed to create user");

            let (_, hash) = db.get_user_credentials("ops").expect("Query failed").unwrap();
            assert_ne!(hash, "secret123");
            assert!(hash.starts_with("$argon2"));
        }
    }
}
