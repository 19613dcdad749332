//! Subscription plan model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A subscription plan offered to syndics.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionPlan {
    pub plan_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_days: i32,
    pub max_buildings: i32,
    pub max_apartments: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlan {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub duration_days: i32,
    pub max_buildings: i32,
    pub max_apartments: i32,
}

/// Partial update of a plan. Pricing fields are protected while any active
/// subscription references the plan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlan {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub duration_days: Option<i32>,
    pub max_buildings: Option<i32>,
    pub max_apartments: Option<i32>,
}

impl UpdatePlan {
    /// Whether the update would change a field that is frozen while active
    /// subscriptions exist.
    pub fn touches_protected_fields(&self, current: &SubscriptionPlan) -> bool {
        self.price.is_some_and(|p| p != current.price)
            || self.duration_days.is_some_and(|d| d != current.duration_days)
            || self.max_buildings.is_some_and(|m| m != current.max_buildings)
            || self
                .max_apartments
                .is_some_and(|m| m != current.max_apartments)
    }
}

/// Filter parameters for listing plans.
#[derive(Debug, Clone, Default)]
pub struct ListPlansFilter {
    pub is_active: Option<bool>,
    pub name_search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SubscriptionPlan {
        SubscriptionPlan {
            plan_id: Uuid::new_v4(),
            name: "Standard".to_string(),
            description: "".to_string(),
            price: "99.00".parse().unwrap(),
            duration_days: 30,
            max_buildings: 5,
            max_apartments: 100,
            is_active: true,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn renaming_is_never_protected() {
        let update = UpdatePlan {
            name: Some("Standard v2".to_string()),
            description: Some("new copy".to_string()),
            ..Default::default()
        };
        assert!(!update.touches_protected_fields(&plan()));
    }

    #[test]
    fn price_change_is_protected() {
        let update = UpdatePlan {
            price: Some("120.00".parse().unwrap()),
            ..Default::default()
        };
        assert!(update.touches_protected_fields(&plan()));
    }

    #[test]
    fn writing_the_same_value_is_not_a_change() {
        let update = UpdatePlan {
            price: Some("99.00".parse().unwrap()),
            duration_days: Some(30),
            ..Default::default()
        };
        assert!(!update.touches_protected_fields(&plan()));
    }
}
