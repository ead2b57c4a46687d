mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::analytics::PopulationCounts;
use crate::auth;
use crate::error::{Error, Result};
use crate::models::*;
use crate::rules::Rule;
use crate::simulation::Simulator;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// How many matching customers a segment member listing returns.
pub const MEMBER_LISTING_LIMIT: usize = 100;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "crm-marketing")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("crm.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        schema::run_migrations(&conn)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("database lock poisoned".to_string()))
    }

    /// Run `f` against one write transaction. Everything it does through the
    /// [`Batch`] commits together; an error rolls all of it back. The store
    /// is locked for the duration, so batches never interleave.
    pub fn batch<T>(&self, f: impl FnOnce(&Batch<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&Batch { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    // ============================================================
    // Customer operations
    // ============================================================

    pub fn list_customers(&self, query: &ListCustomersQuery) -> Result<CustomerPage> {
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = query.page.unwrap_or(1).max(1);

        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(status) = query.status {
            clauses.push("status = ?");
            values.push(status.as_str().to_string());
        }
        if let Some(search) = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            clauses.push("(LOWER(name) LIKE ? OR LOWER(email) LIKE ?)");
            let pattern = format!("%{}%", search.to_lowercase());
            values.push(pattern.clone());
            values.push(pattern);
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM customers{}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let offset = (i64::from(page) - 1) * i64::from(per_page);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM customers{} ORDER BY created_at DESC, name LIMIT {} OFFSET {}",
            CUSTOMER_COLUMNS, where_sql, per_page, offset
        ))?;
        let customers = stmt
            .query_map(params_from_iter(values.iter()), customer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let per_page = i64::from(per_page);
        Ok(CustomerPage {
            customers,
            total,
            pages: (total + per_page - 1) / per_page,
            current_page: page,
        })
    }

    pub fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let conn = self.conn()?;
        fetch_customer(&conn, id)
    }

    pub fn create_customer(&self, input: CreateCustomerInput) -> Result<Customer> {
        self.batch(|store| store.create_customer(input))
    }

    pub fn update_customer(
        &self,
        id: Uuid,
        input: UpdateCustomerInput,
    ) -> Result<Option<Customer>> {
        input.validate()?;

        let conn = self.conn()?;
        let Some(existing) = fetch_customer(&conn, id)? else {
            return Ok(None);
        };

        let email = match input.email {
            Some(email) => {
                let email = email.trim().to_string();
                ensure_email_free(&conn, &email, Some(id))?;
                email
            }
            None => existing.email,
        };

        let now = Utc::now();
        let customer = Customer {
            id,
            name: input
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.name),
            email,
            phone: merge_text(input.phone, existing.phone),
            demographics: input.demographics.unwrap_or(existing.demographics),
            behavioral_data: input.behavioral_data.unwrap_or(existing.behavioral_data),
            purchase_history: input.purchase_history.unwrap_or(existing.purchase_history),
            total_spent: input.total_spent.unwrap_or(existing.total_spent),
            lifetime_value: input.lifetime_value.unwrap_or(existing.lifetime_value),
            engagement_score: input.engagement_score.unwrap_or(existing.engagement_score),
            status: input.status.unwrap_or(existing.status),
            lead_source: merge_text(input.lead_source, existing.lead_source),
            created_at: existing.created_at,
            updated_at: now,
        };

        conn.execute(
            "UPDATE customers SET name = ?, email = ?, phone = ?, demographics = ?,
                behavioral_data = ?, purchase_history = ?, total_spent = ?, lifetime_value = ?,
                engagement_score = ?, status = ?, lead_source = ?, updated_at = ?
             WHERE id = ?",
            params![
                &customer.name,
                &customer.email,
                &customer.phone,
                serde_json::to_string(&customer.demographics)?,
                serde_json::to_string(&customer.behavioral_data)?,
                serde_json::to_string(&customer.purchase_history)?,
                customer.total_spent,
                customer.lifetime_value,
                customer.engagement_score,
                customer.status.as_str(),
                &customer.lead_source,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        Ok(Some(customer))
    }

    pub fn delete_customer(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM customers WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Segment operations
    // ============================================================

    /// Active segments, by name.
    pub fn list_segments(&self) -> Result<Vec<Segment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM segments WHERE is_active = 1 ORDER BY name",
            SEGMENT_COLUMNS
        ))?;
        let segments = stmt
            .query_map([], segment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments)
    }

    pub fn get_segment(&self, id: Uuid) -> Result<Option<Segment>> {
        let conn = self.conn()?;
        fetch_segment(&conn, id)
    }

    /// Create a segment and compute its membership count straight away.
    pub fn create_segment(&self, input: CreateSegmentInput) -> Result<Segment> {
        self.batch(|store| store.create_segment(input))
    }

    /// Partial update. A new rule is applied and counted in the same step.
    pub fn update_segment(&self, id: Uuid, input: UpdateSegmentInput) -> Result<Option<Segment>> {
        if matches!(&input.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::validation("Segment name cannot be empty"));
        }
        let criteria = input.criteria.map(Rule::from);
        if let Some(rule) = &criteria {
            rule.validate()?;
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let Some(existing) = fetch_segment(&tx, id)? else {
            return Ok(None);
        };

        let now = Utc::now();
        let rule_changed = criteria.is_some();
        let mut segment = Segment {
            id,
            name: input
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.name),
            description: merge_text(input.description, existing.description),
            criteria: criteria.unwrap_or(existing.criteria),
            segment_type: input.segment_type.unwrap_or(existing.segment_type),
            is_active: input.is_active.unwrap_or(existing.is_active),
            customer_count: existing.customer_count,
            last_refreshed_at: existing.last_refreshed_at,
            created_at: existing.created_at,
            updated_at: now,
        };

        tx.execute(
            "UPDATE segments SET name = ?, description = ?, criteria = ?, segment_type = ?,
                is_active = ?, updated_at = ?
             WHERE id = ?",
            (
                &segment.name,
                &segment.description,
                serde_json::to_string(&segment.criteria)?,
                segment.segment_type.as_str(),
                segment.is_active,
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;
        if rule_changed {
            refresh_in(&tx, &mut segment)?;
        }
        tx.commit()?;

        Ok(Some(segment))
    }

    /// Delete a segment no campaign targets.
    pub fn delete_segment(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let campaigns: i64 = conn.query_row(
            "SELECT COUNT(*) FROM campaigns WHERE segment_id = ?",
            [id.to_string()],
            |row| row.get(0),
        )?;
        if campaigns > 0 {
            return Err(Error::validation(format!(
                "Segment is targeted by {} campaign(s) and cannot be deleted",
                campaigns
            )));
        }
        let rows = conn.execute("DELETE FROM segments WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    /// Re-evaluate the segment's rule over every customer and store the count.
    pub fn refresh_segment(&self, id: Uuid) -> Result<Segment> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut segment = fetch_segment(&tx, id)?.ok_or(Error::NotFound("Segment"))?;
        refresh_in(&tx, &mut segment)?;
        tx.commit()?;
        Ok(segment)
    }

    pub fn get_segment_members(&self, id: Uuid) -> Result<SegmentMembers> {
        let conn = self.conn()?;
        let segment = fetch_segment(&conn, id)?.ok_or(Error::NotFound("Segment"))?;
        let matching: Vec<Customer> = fetch_all_customers(&conn)?
            .into_iter()
            .filter(|c| segment.criteria.matches(c))
            .collect();

        Ok(SegmentMembers {
            segment_id: id,
            count: matching.len() as i64,
            customers: matching.into_iter().take(MEMBER_LISTING_LIMIT).collect(),
        })
    }

    // ============================================================
    // Campaign operations
    // ============================================================

    pub fn list_campaigns(&self, query: &ListCampaignsQuery) -> Result<Vec<Campaign>> {
        let conn = self.conn()?;
        let campaigns = match query.status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM campaigns WHERE status = ? ORDER BY created_at DESC",
                    CAMPAIGN_COLUMNS
                ))?;
                let rows = stmt.query_map([status.as_str()], campaign_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM campaigns ORDER BY created_at DESC",
                    CAMPAIGN_COLUMNS
                ))?;
                let rows = stmt.query_map([], campaign_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(campaigns)
    }

    pub fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>> {
        let conn = self.conn()?;
        fetch_campaign(&conn, id)
    }

    pub fn create_campaign(&self, input: CreateCampaignInput) -> Result<Campaign> {
        self.batch(|store| store.create_campaign(input))
    }

    /// Partial update of a campaign's content and targeting. Status only
    /// changes through the lifecycle operations.
    pub fn update_campaign(
        &self,
        id: Uuid,
        input: UpdateCampaignInput,
    ) -> Result<Option<Campaign>> {
        input.validate()?;

        let conn = self.conn()?;
        let Some(existing) = fetch_campaign(&conn, id)? else {
            return Ok(None);
        };
        if let Some(segment_id) = input.segment_id {
            fetch_segment(&conn, segment_id)?.ok_or(Error::NotFound("Segment"))?;
        }

        let now = Utc::now();
        let campaign = Campaign {
            id,
            name: input
                .name
                .map(|n| n.trim().to_string())
                .unwrap_or(existing.name),
            description: merge_text(input.description, existing.description),
            campaign_type: input.campaign_type.unwrap_or(existing.campaign_type),
            subject: merge_text(input.subject, existing.subject),
            content: merge_text(input.content, existing.content),
            segment_id: input.segment_id.unwrap_or(existing.segment_id),
            status: existing.status,
            schedule_time: input.schedule_time.or(existing.schedule_time),
            start_date: existing.start_date,
            end_date: existing.end_date,
            budget: input.budget.unwrap_or(existing.budget),
            cost_per_send: input.cost_per_send.unwrap_or(existing.cost_per_send),
            workflow_steps: input.workflow_steps.unwrap_or(existing.workflow_steps),
            created_at: existing.created_at,
            updated_at: now,
        };

        conn.execute(
            "UPDATE campaigns SET name = ?, description = ?, campaign_type = ?, subject = ?,
                content = ?, segment_id = ?, schedule_time = ?, budget = ?, cost_per_send = ?,
                workflow_steps = ?, updated_at = ?
             WHERE id = ?",
            params![
                &campaign.name,
                &campaign.description,
                campaign.campaign_type.as_str(),
                &campaign.subject,
                &campaign.content,
                campaign.segment_id.to_string(),
                campaign.schedule_time.map(|t| t.to_rfc3339()),
                campaign.budget,
                campaign.cost_per_send,
                serde_json::to_string(&campaign.workflow_steps)?,
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;

        Ok(Some(campaign))
    }

    /// Move a draft campaign to active and record its simulated result.
    ///
    /// The status change, start date and result row are committed together,
    /// so a campaign is launched at most once and has at most one result.
    pub fn launch_campaign(&self, id: Uuid, simulator: &Simulator) -> Result<CampaignLaunch> {
        let launch = self.batch(|store| store.launch_campaign(id, simulator))?;
        tracing::info!(
            campaign = %id,
            audience = launch.result.total_sent,
            conversions = launch.result.conversions,
            "Campaign launched"
        );
        Ok(launch)
    }

    pub fn pause_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.batch(|store| store.pause_campaign(id))
    }

    pub fn resume_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.batch(|store| store.resume_campaign(id))
    }

    pub fn complete_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.batch(|store| store.complete_campaign(id))
    }

    // ============================================================
    // Campaign result operations
    // ============================================================

    pub fn get_campaign_result(&self, campaign_id: Uuid) -> Result<Option<CampaignResult>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM campaign_results WHERE campaign_id = ?",
                    RESULT_COLUMNS
                ),
                [campaign_id.to_string()],
                result_from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// Every stored result, oldest first.
    pub fn list_campaign_results(&self) -> Result<Vec<CampaignResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM campaign_results ORDER BY created_at",
            RESULT_COLUMNS
        ))?;
        let results = stmt
            .query_map([], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    pub fn population_counts(&self) -> Result<PopulationCounts> {
        let conn = self.conn()?;
        Batch { conn: &conn }.population_counts()
    }

    // ============================================================
    // User and session operations
    // ============================================================

    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        self.batch(|store| store.create_user(input))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, role, created_at FROM users WHERE id = ?",
                [id.to_string()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// The user and stored password hash for `username`.
    pub fn get_user_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let conn = self.conn()?;
        Batch { conn: &conn }.get_user_credentials(username)
    }

    pub fn count_users(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn create_auth_session(&self, session: &AuthSession) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO auth_sessions (token, user_id, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
            (
                &session.token,
                session.user_id.to_string(),
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn get_auth_session(&self, token: &str) -> Result<Option<AuthSession>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM auth_sessions WHERE token = ?",
                [token],
                |row| {
                    Ok(AuthSession {
                        token: row.get(0)?,
                        user_id: parse_uuid(row.get::<_, String>(1)?),
                        created_at: parse_datetime(row.get::<_, String>(2)?),
                        expires_at: parse_datetime(row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    pub fn delete_auth_session(&self, token: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM auth_sessions WHERE token = ?", [token])?;
        Ok(rows > 0)
    }

    /// Drop sessions that expired before `now`. Returns how many were removed.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT token, expires_at FROM auth_sessions")?;
        let sessions = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    parse_datetime(row.get::<_, String>(1)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut removed = 0;
        for (token, expires_at) in sessions {
            if expires_at <= now {
                removed += conn.execute("DELETE FROM auth_sessions WHERE token = ?", [&token])?;
            }
        }
        Ok(removed)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Store operations bound to an open transaction, handed out by
/// [`Database::batch`].
pub struct Batch<'a> {
    conn: &'a Connection,
}

impl Batch<'_> {
    pub fn create_customer(&self, input: CreateCustomerInput) -> Result<Customer> {
        input.validate()?;

        let email = input.email.trim().to_string();
        ensure_email_free(self.conn, &email, None)?;

        let now = Utc::now();
        let customer = Customer {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email,
            phone: input.phone,
            demographics: input.demographics.unwrap_or_default(),
            behavioral_data: input.behavioral_data.unwrap_or_default(),
            purchase_history: input.purchase_history.unwrap_or_default(),
            total_spent: input.total_spent.unwrap_or(0.0),
            lifetime_value: input.lifetime_value.unwrap_or(0.0),
            engagement_score: input.engagement_score.unwrap_or(0),
            status: input.status.unwrap_or_default(),
            lead_source: input.lead_source,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO customers (id, name, email, phone, demographics, behavioral_data,
                purchase_history, total_spent, lifetime_value, engagement_score, status,
                lead_source, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                customer.id.to_string(),
                &customer.name,
                &customer.email,
                &customer.phone,
                serde_json::to_string(&customer.demographics)?,
                serde_json::to_string(&customer.behavioral_data)?,
                serde_json::to_string(&customer.purchase_history)?,
                customer.total_spent,
                customer.lifetime_value,
                customer.engagement_score,
                customer.status.as_str(),
                &customer.lead_source,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(customer)
    }

    pub fn create_segment(&self, input: CreateSegmentInput) -> Result<Segment> {
        if input.name.trim().is_empty() {
            return Err(Error::validation("Segment name is required"));
        }
        let criteria = input.criteria.map(Rule::from).unwrap_or_else(Rule::all);
        criteria.validate()?;

        let now = Utc::now();
        let mut segment = Segment {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            criteria,
            segment_type: input.segment_type.unwrap_or_default(),
            is_active: true,
            customer_count: 0,
            last_refreshed_at: None,
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO segments (id, name, description, criteria, segment_type, is_active,
                customer_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?)",
            (
                segment.id.to_string(),
                &segment.name,
                &segment.description,
                serde_json::to_string(&segment.criteria)?,
                segment.segment_type.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;
        refresh_in(self.conn, &mut segment)?;

        Ok(segment)
    }

    pub fn create_campaign(&self, input: CreateCampaignInput) -> Result<Campaign> {
        input.validate()?;
        fetch_segment(self.conn, input.segment_id)?.ok_or(Error::NotFound("Segment"))?;

        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            description: input.description,
            campaign_type: input.campaign_type.unwrap_or_default(),
            subject: input.subject,
            content: input.content,
            segment_id: input.segment_id,
            status: CampaignStatus::Draft,
            schedule_time: input.schedule_time,
            start_date: None,
            end_date: None,
            budget: input.budget.unwrap_or(0.0),
            cost_per_send: input.cost_per_send.unwrap_or(DEFAULT_COST_PER_SEND),
            workflow_steps: input.workflow_steps.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        self.conn.execute(
            "INSERT INTO campaigns (id, name, description, campaign_type, subject, content,
                segment_id, status, schedule_time, budget, cost_per_send, workflow_steps,
                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                campaign.id.to_string(),
                &campaign.name,
                &campaign.description,
                campaign.campaign_type.as_str(),
                &campaign.subject,
                &campaign.content,
                campaign.segment_id.to_string(),
                campaign.status.as_str(),
                campaign.schedule_time.map(|t| t.to_rfc3339()),
                campaign.budget,
                campaign.cost_per_send,
                serde_json::to_string(&campaign.workflow_steps)?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(campaign)
    }

    /// Launch a draft: the audience is the segment rule evaluated now, not
    /// the cached count.
    pub fn launch_campaign(&self, id: Uuid, simulator: &Simulator) -> Result<CampaignLaunch> {
        let mut campaign =
            fetch_campaign(self.conn, id)?.ok_or(Error::NotFound("Campaign"))?;
        let next = campaign.status.transition(CampaignAction::Launch)?;
        let segment =
            fetch_segment(self.conn, campaign.segment_id)?.ok_or(Error::NotFound("Segment"))?;

        let audience = fetch_all_customers(self.conn)?
            .iter()
            .filter(|c| segment.criteria.matches(c))
            .count() as i64;
        let result = simulator.simulate(&campaign, audience);
        let now = result.created_at;

        self.conn.execute(
            "UPDATE campaigns SET status = ?, start_date = ?, updated_at = ? WHERE id = ?",
            (next.as_str(), now.to_rfc3339(), now.to_rfc3339(), id.to_string()),
        )?;
        insert_result(self.conn, &result)?;

        campaign.status = next;
        campaign.start_date = Some(now);
        campaign.updated_at = now;
        Ok(CampaignLaunch { campaign, result })
    }

    pub fn pause_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.apply_transition(id, CampaignAction::Pause)
    }

    pub fn resume_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.apply_transition(id, CampaignAction::Resume)
    }

    pub fn complete_campaign(&self, id: Uuid) -> Result<Campaign> {
        self.apply_transition(id, CampaignAction::Complete)
    }

    /// Pause, resume or complete. Launch goes through [`Self::launch_campaign`].
    fn apply_transition(&self, id: Uuid, action: CampaignAction) -> Result<Campaign> {
        let mut campaign =
            fetch_campaign(self.conn, id)?.ok_or(Error::NotFound("Campaign"))?;
        let next = campaign.status.transition(action)?;
        let now = Utc::now();
        if next == CampaignStatus::Completed {
            campaign.end_date = Some(now);
        }

        self.conn.execute(
            "UPDATE campaigns SET status = ?, end_date = ?, updated_at = ? WHERE id = ?",
            (
                next.as_str(),
                campaign.end_date.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
                id.to_string(),
            ),
        )?;

        campaign.status = next;
        campaign.updated_at = now;
        Ok(campaign)
    }

    pub fn population_counts(&self) -> Result<PopulationCounts> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(PopulationCounts {
            customers: count("SELECT COUNT(*) FROM customers")?,
            active_segments: count("SELECT COUNT(*) FROM segments WHERE is_active = 1")?,
            leads: count("SELECT COUNT(*) FROM customers WHERE status = 'lead'")?,
        })
    }

    pub fn create_user(&self, input: CreateUserInput) -> Result<User> {
        input.validate()?;

        let username = input.username.trim().to_string();
        let taken: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?",
            [&username],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::validation(format!(
                "Username {} is already taken",
                username
            )));
        }
        if let Some(email) = &input.email {
            let taken: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?",
                [email],
                |row| row.get(0),
            )?;
            if taken > 0 {
                return Err(Error::validation(format!(
                    "A user with email {} already exists",
                    email
                )));
            }
        }

        let password_hash = auth::hash_password(&input.password)?;
        let user = User {
            id: Uuid::new_v4(),
            username,
            email: input.email,
            role: input.role.unwrap_or_default(),
            created_at: Utc::now(),
        };

        self.conn.execute(
            "INSERT INTO users (id, username, email, password_hash, role, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                user.id.to_string(),
                &user.username,
                &user.email,
                &password_hash,
                user.role.as_str(),
                user.created_at.to_rfc3339(),
            ),
        )?;

        Ok(user)
    }

    pub fn get_user_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let credentials = self
            .conn
            .query_row(
                "SELECT id, username, email, role, created_at, password_hash
                 FROM users WHERE username = ?",
                [username],
                |row| Ok((user_from_row(row)?, row.get::<_, String>(5)?)),
            )
            .optional()?;
        Ok(credentials)
    }
}

// ============================================================
// Row mapping
// ============================================================

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, demographics, behavioral_data, \
     purchase_history, total_spent, lifetime_value, engagement_score, status, lead_source, \
     created_at, updated_at";

const SEGMENT_COLUMNS: &str = "id, name, description, criteria, segment_type, is_active, \
     customer_count, last_refreshed_at, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, name, description, campaign_type, subject, content, \
     segment_id, status, schedule_time, start_date, end_date, budget, cost_per_send, \
     workflow_steps, created_at, updated_at";

const RESULT_COLUMNS: &str = "campaign_id, total_sent, delivered, bounced, impressions, opens, \
     clicks, conversions, leads_generated, leads_converted, revenue, total_cost, created_at";

fn customer_from_row(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        demographics: json_column(row, 4)?,
        behavioral_data: json_column(row, 5)?,
        purchase_history: json_column(row, 6)?,
        total_spent: row.get(7)?,
        lifetime_value: row.get(8)?,
        engagement_score: row.get(9)?,
        status: CustomerStatus::from_str(&row.get::<_, String>(10)?).unwrap_or_default(),
        lead_source: row.get(11)?,
        created_at: parse_datetime(row.get::<_, String>(12)?),
        updated_at: parse_datetime(row.get::<_, String>(13)?),
    })
}

fn segment_from_row(row: &Row<'_>) -> rusqlite::Result<Segment> {
    Ok(Segment {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        criteria: json_column(row, 3)?,
        segment_type: SegmentType::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        is_active: row.get(5)?,
        customer_count: row.get(6)?,
        last_refreshed_at: row.get::<_, Option<String>>(7)?.map(parse_datetime),
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
    })
}

fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        campaign_type: CampaignType::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        subject: row.get(4)?,
        content: row.get(5)?,
        segment_id: parse_uuid(row.get::<_, String>(6)?),
        status: CampaignStatus::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
        schedule_time: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        start_date: row.get::<_, Option<String>>(9)?.map(parse_datetime),
        end_date: row.get::<_, Option<String>>(10)?.map(parse_datetime),
        budget: row.get(11)?,
        cost_per_send: row.get(12)?,
        workflow_steps: json_column(row, 13)?,
        created_at: parse_datetime(row.get::<_, String>(14)?),
        updated_at: parse_datetime(row.get::<_, String>(15)?),
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignResult> {
    Ok(CampaignResult {
        campaign_id: parse_uuid(row.get::<_, String>(0)?),
        total_sent: row.get(1)?,
        delivered: row.get(2)?,
        bounced: row.get(3)?,
        impressions: row.get(4)?,
        opens: row.get(5)?,
        clicks: row.get(6)?,
        conversions: row.get(7)?,
        leads_generated: row.get(8)?,
        leads_converted: row.get(9)?,
        revenue: row.get(10)?,
        total_cost: row.get(11)?,
        created_at: parse_datetime(row.get::<_, String>(12)?),
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row.get::<_, String>(0)?),
        username: row.get(1)?,
        email: row.get(2)?,
        role: Role::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
        created_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

// ============================================================
// Queries shared by the locked operations above
// ============================================================

fn fetch_customer(conn: &Connection, id: Uuid) -> Result<Option<Customer>> {
    let customer = conn
        .query_row(
            &format!("SELECT {} FROM customers WHERE id = ?", CUSTOMER_COLUMNS),
            [id.to_string()],
            customer_from_row,
        )
        .optional()?;
    Ok(customer)
}

fn fetch_all_customers(conn: &Connection) -> Result<Vec<Customer>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM customers ORDER BY created_at DESC, name",
        CUSTOMER_COLUMNS
    ))?;
    let customers = stmt
        .query_map([], customer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(customers)
}

fn fetch_segment(conn: &Connection, id: Uuid) -> Result<Option<Segment>> {
    let segment = conn
        .query_row(
            &format!("SELECT {} FROM segments WHERE id = ?", SEGMENT_COLUMNS),
            [id.to_string()],
            segment_from_row,
        )
        .optional()?;
    Ok(segment)
}

fn fetch_campaign(conn: &Connection, id: Uuid) -> Result<Option<Campaign>> {
    let campaign = conn
        .query_row(
            &format!("SELECT {} FROM campaigns WHERE id = ?", CAMPAIGN_COLUMNS),
            [id.to_string()],
            campaign_from_row,
        )
        .optional()?;
    Ok(campaign)
}

fn ensure_email_free(conn: &Connection, email: &str, except: Option<Uuid>) -> Result<()> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT id FROM customers WHERE LOWER(email) = LOWER(?)",
            [email],
            |row| row.get(0),
        )
        .optional()?;

    match owner {
        Some(owner) if except.map(|id| id.to_string()).as_deref() != Some(owner.as_str()) => {
            Err(Error::validation(format!(
                "A customer with email {} already exists",
                email
            )))
        }
        _ => Ok(()),
    }
}

/// A supplied blank string clears an optional text field; `None` keeps it.
fn merge_text(update: Option<String>, existing: Option<String>) -> Option<String> {
    match update {
        Some(value) if value.trim().is_empty() => None,
        Some(value) => Some(value),
        None => existing,
    }
}

fn refresh_in(conn: &Connection, segment: &mut Segment) -> Result<()> {
    let count = fetch_all_customers(conn)?
        .iter()
        .filter(|c| segment.criteria.matches(c))
        .count() as i64;
    let now = Utc::now();

    conn.execute(
        "UPDATE segments SET customer_count = ?, last_refreshed_at = ? WHERE id = ?",
        (count, now.to_rfc3339(), segment.id.to_string()),
    )?;

    tracing::debug!(segment = %segment.id, count, "Segment refreshed");
    segment.customer_count = count;
    segment.last_refreshed_at = Some(now);
    Ok(())
}

fn insert_result(conn: &Connection, result: &CampaignResult) -> Result<()> {
    conn.execute(
        "INSERT INTO campaign_results (campaign_id, total_sent, delivered, bounced, impressions,
            opens, clicks, conversions, leads_generated, leads_converted, revenue, total_cost,
            created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            result.campaign_id.to_string(),
            result.total_sent,
            result.delivered,
            result.bounced,
            result.impressions,
            result.opens,
            result.clicks,
            result.conversions,
            result.leads_generated,
            result.leads_converted,
            result.revenue,
            result.total_cost,
            result.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
