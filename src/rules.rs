//! Segment rules: a tagged predicate tree and its evaluation against a customer.
//!
//! A rule is either a single predicate `(field, operator, value)` or an AND/OR
//! node over child rules, nested to any depth (bounded by [`MAX_DEPTH`] at
//! validation time). Evaluation is pure: it reads the customer and nothing
//! else, so the same customer and rule always produce the same answer.
//!
//! Fields that the customer does not have, or that hold `null`, never match.
//! A rule over an attribute nobody has imported yet silently selects no one
//! instead of failing the refresh.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::Customer;

/// Deepest allowed nesting of AND/OR nodes.
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// Matches when every child matches. An empty AND matches everyone.
    And { rules: Vec<Rule> },
    /// Matches when any child matches. An empty OR matches no one.
    Or { rules: Vec<Rule> },
    Predicate(Predicate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Attribute path, e.g. `lifetime_value`, `demographics.age`, `country`.
    pub field: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Case-insensitive substring match.
    Contains,
    /// The customer value is one of the listed values.
    In,
}

impl Operator {
    fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte)
    }
}

/// How segment criteria arrive over the wire.
///
/// Besides the tree form, the flat `{"rules": [...], "match": "all" | "any"}`
/// shape used by existing segment definitions is accepted and folded into a
/// single AND/OR node.
///
/// An object with a `"type"` key must be a valid tree; anything else must be
/// the flat shape with a `rules` list and no other keys.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Criteria {
    Tree(Rule),
    Flat {
        rules: Vec<Predicate>,
        #[serde(rename = "match")]
        match_mode: MatchMode,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FlatCriteria {
    rules: Vec<Predicate>,
    #[serde(default, rename = "match")]
    match_mode: MatchMode,
}

impl<'de> Deserialize<'de> for Criteria {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let value = Value::deserialize(deserializer)?;
        let is_tree = value.as_object().is_some_and(|o| o.contains_key("type"));
        if is_tree {
            Rule::deserialize(value)
                .map(Criteria::Tree)
                .map_err(|e| D::Error::custom(format!("invalid rule: {}", e)))
        } else {
            let flat = FlatCriteria::deserialize(value)
                .map_err(|e| D::Error::custom(format!("invalid criteria: {}", e)))?;
            Ok(Criteria::Flat {
                rules: flat.rules,
                match_mode: flat.match_mode,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

impl From<Criteria> for Rule {
    fn from(criteria: Criteria) -> Self {
        match criteria {
            Criteria::Tree(rule) => rule,
            // No rules at all selects everyone, whatever the match mode.
            Criteria::Flat { rules, .. } if rules.is_empty() => Rule::all(),
            Criteria::Flat { rules, match_mode } => {
                let rules = rules.into_iter().map(Rule::Predicate).collect();
                match match_mode {
                    MatchMode::All => Rule::And { rules },
                    MatchMode::Any => Rule::Or { rules },
                }
            }
        }
    }
}

impl Rule {
    /// The rule that matches every customer.
    pub fn all() -> Self {
        Self::And { rules: Vec::new() }
    }

    pub fn and(rules: Vec<Rule>) -> Self {
        Self::And { rules }
    }

    pub fn or(rules: Vec<Rule>) -> Self {
        Self::Or { rules }
    }

    pub fn predicate(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::Predicate(Predicate {
            field: field.into(),
            operator,
            value: value.into(),
        })
    }

    /// Reject rules that could never be meaningful: blank fields, ordering
    /// comparisons against non-numbers, `in` without a list, runaway nesting.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(Error::validation(format!(
                "Rule nesting exceeds {} levels",
                MAX_DEPTH
            )));
        }
        match self {
            Self::And { rules } | Self::Or { rules } => {
                rules.iter().try_for_each(|r| r.validate_at(depth + 1))
            }
            Self::Predicate(p) => p.validate(),
        }
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match self {
            Self::And { rules } => rules.iter().all(|r| r.matches(customer)),
            Self::Or { rules } => rules.iter().any(|r| r.matches(customer)),
            Self::Predicate(p) => p.matches(customer),
        }
    }
}

impl Predicate {
    fn validate(&self) -> Result<()> {
        if self.field.trim().is_empty() {
            return Err(Error::validation("Rule field cannot be empty"));
        }
        if self.operator.is_ordering() && as_number(&self.value).is_none() {
            return Err(Error::validation(format!(
                "Rule on '{}' compares against a non-numeric value",
                self.field
            )));
        }
        if self.operator == Operator::In && !self.value.is_array() {
            return Err(Error::validation(format!(
                "Rule on '{}' uses 'in' without a list of values",
                self.field
            )));
        }
        if self.operator == Operator::Contains && self.value.is_null() {
            return Err(Error::validation(format!(
                "Rule on '{}' uses 'contains' without a value",
                self.field
            )));
        }
        Ok(())
    }

    pub fn matches(&self, customer: &Customer) -> bool {
        match resolve_field(customer, &self.field) {
            Some(actual) => compare(&actual, self.operator, &self.value),
            None => false,
        }
    }
}

/// Evaluate `rule` against `customer`.
pub fn evaluate(customer: &Customer, rule: &Rule) -> bool {
    rule.matches(customer)
}

/// Look up a dotted attribute path on a customer.
///
/// Top-level attributes win; `demographics.*` and `behavioral_data.*` walk
/// into the JSON objects; a bare name that is not a top-level attribute is
/// looked up in demographics and then behavioral data. Returns `None` for
/// anything missing or `null`.
pub fn resolve_field(customer: &Customer, path: &str) -> Option<Value> {
    let mut parts = path.split('.');
    let head = parts.next()?.trim();
    let rest: Vec<&str> = parts.collect();

    let value = match head {
        "id" => Value::from(customer.id.to_string()),
        "name" => Value::from(customer.name.as_str()),
        "email" => Value::from(customer.email.as_str()),
        "phone" => Value::from(customer.phone.clone()),
        "status" => Value::from(customer.status.as_str()),
        "lead_source" => Value::from(customer.lead_source.clone()),
        "total_spent" => Value::from(customer.total_spent),
        "lifetime_value" | "ltv" => Value::from(customer.lifetime_value),
        "engagement_score" => Value::from(customer.engagement_score),
        "demographics" => return walk(&customer.demographics, &rest),
        "behavioral_data" => return walk(&customer.behavioral_data, &rest),
        "purchase_history" => return purchase_field(customer, &rest),
        other if rest.is_empty() => customer
            .demographics
            .get(other)
            .or_else(|| customer.behavioral_data.get(other))
            .cloned()
            .unwrap_or(Value::Null),
        _ => return None,
    };

    if !rest.is_empty() || value.is_null() {
        return None;
    }
    Some(value)
}

fn walk(root: &serde_json::Map<String, Value>, path: &[&str]) -> Option<Value> {
    let Some((first, rest)) = path.split_first() else {
        return Some(Value::Object(root.clone()));
    };
    let mut current = root.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    (!current.is_null()).then(|| current.clone())
}

fn purchase_field(customer: &Customer, path: &[&str]) -> Option<Value> {
    match path {
        [] => serde_json::to_value(&customer.purchase_history).ok(),
        ["count"] => Some(Value::from(customer.purchase_history.len())),
        ["total"] => Some(Value::from(
            customer.purchase_history.iter().map(|p| p.amount).sum::<f64>(),
        )),
        _ => None,
    }
}

fn compare(actual: &Value, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::Eq => values_equal(actual, expected),
        Operator::Neq => !values_equal(actual, expected),
        Operator::Gt => ordering(actual, expected).is_some_and(|o| o.is_gt()),
        Operator::Gte => ordering(actual, expected).is_some_and(|o| o.is_ge()),
        Operator::Lt => ordering(actual, expected).is_some_and(|o| o.is_lt()),
        Operator::Lte => ordering(actual, expected).is_some_and(|o| o.is_le()),
        Operator::Contains => {
            let needle = text(expected).to_lowercase();
            match actual {
                Value::Array(items) => items
                    .iter()
                    .any(|item| text(item).to_lowercase().contains(&needle)),
                _ => text(actual).to_lowercase().contains(&needle),
            }
        }
        Operator::In => expected
            .as_array()
            .is_some_and(|list| list.iter().any(|v| values_equal(actual, v))),
    }
}

/// Numbers compare numerically (so `100` equals `100.0`); everything else by
/// JSON equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    as_number(a)?.partial_cmp(&as_number(b)?)
}

/// Numbers, and strings that parse as numbers.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerStatus, Purchase};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn customer() -> Customer {
        Customer {
            id: Uuid::new_v4(),
            name: "Jane Smith".to_string(),
            email: "jane.smith@example.com".to_string(),
            phone: None,
            demographics: json!({
                "age": 34,
                "country": "US",
                "location": "New York",
                "address": { "city": "Brooklyn" }
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
            behavioral_data: json!({ "website_visits": 12, "last_activity_days": "7" })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            purchase_history: vec![
                Purchase {
                    product: "Boots".to_string(),
                    amount: 120.0,
                    date: None,
                },
                Purchase {
                    product: "Scarf".to_string(),
                    amount: 30.5,
                    date: None,
                },
            ],
            total_spent: 150.5,
            lifetime_value: 320.0,
            engagement_score: 72,
            status: CustomerStatus::Customer,
            lead_source: Some("Referral".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn country_and_ltv_rule_matches() {
        let rule = Rule::and(vec![
            Rule::predicate("country", Operator::Eq, "US"),
            Rule::predicate("ltv", Operator::Gt, 100),
        ]);
        assert!(evaluate(&customer(), &rule));

        let mut low_value = customer();
        low_value.lifetime_value = 99.0;
        assert!(!evaluate(&low_value, &rule));
    }

    #[test]
    fn nested_or_inside_and() {
        let rule = Rule::and(vec![
            Rule::predicate("status", Operator::Eq, "customer"),
            Rule::or(vec![
                Rule::predicate("demographics.location", Operator::Eq, "Chicago"),
                Rule::predicate("demographics.address.city", Operator::Contains, "brook"),
            ]),
        ]);
        assert!(evaluate(&customer(), &rule));
    }

    #[test]
    fn unknown_fields_never_match() {
        let c = customer();
        for op in [Operator::Eq, Operator::Neq, Operator::Gt, Operator::Contains] {
            let rule = Rule::predicate("favourite_colour", op, "blue");
            assert!(!evaluate(&c, &rule), "{:?} matched a missing field", op);
        }
        assert!(!evaluate(&c, &Rule::predicate("demographics.shoe_size", Operator::Lt, 50)));
        assert!(!evaluate(&c, &Rule::predicate("total_spent.cents", Operator::Gt, 0)));
    }

    #[test]
    fn null_values_never_match() {
        let c = customer();
        assert!(!evaluate(&c, &Rule::predicate("phone", Operator::Neq, "555")));
    }

    #[test]
    fn empty_groups() {
        let c = customer();
        assert!(evaluate(&c, &Rule::all()));
        assert!(!evaluate(&c, &Rule::or(vec![])));
    }

    #[test]
    fn numeric_coercion_of_strings() {
        let c = customer();
        assert!(evaluate(&c, &Rule::predicate("last_activity_days", Operator::Lte, 7)));
        assert!(evaluate(&c, &Rule::predicate("engagement_score", Operator::Gte, "70")));
        assert!(!evaluate(&c, &Rule::predicate("name", Operator::Gt, 1)));
    }

    #[test]
    fn eq_treats_integers_and_floats_alike() {
        let c = customer();
        assert!(evaluate(&c, &Rule::predicate("lifetime_value", Operator::Eq, 320)));
        assert!(!evaluate(&c, &Rule::predicate("demographics.age", Operator::Eq, "34")));
    }

    #[test]
    fn in_operator_checks_membership() {
        let c = customer();
        let rule = Rule::predicate("country", Operator::In, json!(["CA", "US"]));
        assert!(evaluate(&c, &rule));
        let rule = Rule::predicate("status", Operator::In, json!(["lead", "prospect"]));
        assert!(!evaluate(&c, &rule));
    }

    #[test]
    fn purchase_history_fields() {
        let c = customer();
        assert!(evaluate(&c, &Rule::predicate("purchase_history.count", Operator::Eq, 2)));
        assert!(evaluate(&c, &Rule::predicate("purchase_history.total", Operator::Gt, 150)));
        assert!(evaluate(&c, &Rule::predicate("purchase_history", Operator::Contains, "boots")));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let c = customer();
        let rule = Rule::or(vec![
            Rule::predicate("email", Operator::Contains, "EXAMPLE"),
            Rule::predicate("engagement_score", Operator::Lt, 10),
        ]);
        let first = evaluate(&c, &rule);
        for _ in 0..10 {
            assert_eq!(evaluate(&c, &rule), first);
        }
        assert_eq!(c.email, "jane.smith@example.com");
    }

    #[test]
    fn parses_tree_json() {
        let rule: Rule = serde_json::from_value(json!({
            "type": "or",
            "rules": [
                { "type": "predicate", "field": "ltv", "operator": "gte", "value": 100 },
                { "type": "and", "rules": [] }
            ]
        }))
        .unwrap();
        assert_eq!(
            rule,
            Rule::or(vec![Rule::predicate("ltv", Operator::Gte, 100), Rule::all()])
        );
    }

    #[test]
    fn flat_criteria_fold_into_a_group() {
        let criteria: Criteria = serde_json::from_value(json!({
            "rules": [
                { "field": "demographics.age", "operator": "gte", "value": 25 },
                { "field": "demographics.age", "operator": "lte", "value": 40 }
            ],
            "match": "any"
        }))
        .unwrap();
        let rule = Rule::from(criteria);
        assert!(matches!(rule, Rule::Or { ref rules } if rules.len() == 2));
    }

    #[test]
    fn flat_criteria_without_rules_match_everyone() {
        let criteria: Criteria =
            serde_json::from_value(json!({ "rules": [], "match": "any" })).unwrap();
        let rule = Rule::from(criteria);
        assert!(evaluate(&customer(), &rule));
    }

    #[test]
    fn malformed_criteria_do_not_parse() {
        let payloads = [
            // unknown operator
            json!({ "type": "predicate", "field": "ltv", "operator": "greater_than", "value": 100 }),
            // predicate without a type tag
            json!({ "field": "ltv", "operator": "gt", "value": 100 }),
            // unknown node type
            json!({ "type": "andd", "rules": [] }),
            // flat shape without rules
            json!({ "match": "any" }),
            json!("country = US"),
        ];
        for payload in payloads {
            assert!(
                serde_json::from_value::<Criteria>(payload.clone()).is_err(),
                "accepted {}",
                payload
            );
        }
    }

    #[test]
    fn criteria_accept_tree_json() {
        let criteria: Criteria = serde_json::from_value(json!({
            "type": "predicate", "field": "ltv", "operator": "gt", "value": 100
        }))
        .unwrap();
        assert_eq!(
            Rule::from(criteria),
            Rule::predicate("ltv", Operator::Gt, 100)
        );
    }

    #[test]
    fn validation_rejects_malformed_rules() {
        assert!(Rule::predicate(" ", Operator::Eq, 1).validate().is_err());
        assert!(Rule::predicate("ltv", Operator::Gt, "lots").validate().is_err());
        assert!(Rule::predicate("country", Operator::In, "US").validate().is_err());
        assert!(Rule::predicate("name", Operator::Contains, Value::Null)
            .validate()
            .is_err());
        assert!(Rule::predicate("ltv", Operator::Gt, "100").validate().is_ok());
    }

    #[test]
    fn validation_bounds_nesting() {
        let mut rule = Rule::predicate("ltv", Operator::Gt, 1);
        for _ in 0..MAX_DEPTH {
            rule = Rule::and(vec![rule]);
        }
        assert!(matches!(rule.validate(), Err(Error::Validation(_))));
    }
}
