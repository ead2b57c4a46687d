use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Free-form JSON attributes (demographics, behavioral data).
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// A person known to the marketing module: lead, prospect or paying customer.
///
/// This is the record the segment rules are evaluated against. Demographic and
/// behavioral data are open-ended JSON objects so operators can segment on any
/// attribute they import without a schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Age, gender, location, country, income bracket, ...
    pub demographics: Attributes,
    /// Website visits, email opens, days since last activity, ...
    pub behavioral_data: Attributes,
    pub purchase_history: Vec<Purchase>,
    pub total_spent: f64,
    pub lifetime_value: f64,
    /// 0 to 100.
    pub engagement_score: i64,
    pub status: CustomerStatus,
    pub lead_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub product: String,
    pub amount: f64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Where a customer sits in the sales pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    #[default]
    Lead,
    Prospect,
    Customer,
    Churned,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Prospect => "prospect",
            Self::Customer => "customer",
            Self::Churned => "churned",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(Self::Lead),
            "prospect" => Some(Self::Prospect),
            "customer" => Some(Self::Customer),
            "churned" => Some(Self::Churned),
            _ => None,
        }
    }
}

/// Input for creating a customer. Only `name` and `email` are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCustomerInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub demographics: Option<Attributes>,
    #[serde(default)]
    pub behavioral_data: Option<Attributes>,
    #[serde(default)]
    pub purchase_history: Option<Vec<Purchase>>,
    #[serde(default)]
    pub total_spent: Option<f64>,
    #[serde(default)]
    pub lifetime_value: Option<f64>,
    #[serde(default)]
    pub engagement_score: Option<i64>,
    #[serde(default)]
    pub status: Option<CustomerStatus>,
    #[serde(default)]
    pub lead_source: Option<String>,
}

impl CreateCustomerInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("Customer name is required"));
        }
        validate_email(&self.email)?;
        if let Some(score) = self.engagement_score {
            validate_engagement(score)?;
        }
        Ok(())
    }
}

/// Input for updating a customer. All fields are optional for partial updates.
///
/// `phone` and `lead_source` are cleared by sending an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCustomerInput {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub demographics: Option<Attributes>,
    pub behavioral_data: Option<Attributes>,
    pub purchase_history: Option<Vec<Purchase>>,
    pub total_spent: Option<f64>,
    pub lifetime_value: Option<f64>,
    pub engagement_score: Option<i64>,
    pub status: Option<CustomerStatus>,
    pub lead_source: Option<String>,
}

impl UpdateCustomerInput {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(Error::validation("Customer name cannot be empty"));
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(score) = self.engagement_score {
            validate_engagement(score)?;
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(Error::validation("Customer email is required"));
    }
    if !email.contains('@') {
        return Err(Error::validation(format!("Invalid email address: {}", email)));
    }
    Ok(())
}

fn validate_engagement(score: i64) -> Result<()> {
    if !(0..=100).contains(&score) {
        return Err(Error::validation("Engagement score must be between 0 and 100"));
    }
    Ok(())
}

/// Query parameters for listing customers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCustomersQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<CustomerStatus>,
    /// Case-insensitive match against name and email.
    pub search: Option<String>,
}

/// One page of customers, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerPage {
    pub customers: Vec<Customer>,
    pub total: i64,
    pub pages: i64,
    pub current_page: u32,
}
