//! Subscription model.
//!
//! One subscription per syndic. `is_active` and `days_remaining` are derived
//! from `status` and `end_date` on read and never stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Suspended,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => SubscriptionStatus::Active,
            "suspended" => SubscriptionStatus::Suspended,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Expired,
        }
    }
}

/// A syndic's subscription to a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub syndic_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub auto_renew: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// Active status and today inside the period, both bounds inclusive.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Active.as_str()
            && self.start_date <= today
            && today <= self.end_date
    }

    /// Days until expiry, floored at zero.
    pub fn days_remaining(&self, today: NaiveDate) -> i64 {
        (self.end_date - today).num_days().max(0)
    }

    pub fn view(self, today: NaiveDate) -> SubscriptionView {
        let is_active = self.is_active(today);
        let days_remaining = self.days_remaining(today);
        SubscriptionView {
            subscription: self,
            is_active,
            days_remaining,
        }
    }
}

/// Read model carrying the derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub is_active: bool,
    pub days_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: &str, end: NaiveDate) -> Subscription {
        Subscription {
            subscription_id: Uuid::new_v4(),
            syndic_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date: end,
            status: status.to_string(),
            auto_renew: false,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    #[test]
    fn active_until_end_date_inclusive() {
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let sub = subscription("active", end);
        assert!(sub.is_active(end));
        assert!(!sub.is_active(end.succ_opt().unwrap()));
    }

    #[test]
    fn not_active_before_the_start_date() {
        let mut sub = subscription("active", NaiveDate::from_ymd_opt(2026, 10, 31).unwrap());
        sub.start_date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        // A renewal chained onto a live period starts in the future
        assert!(!sub.is_active(NaiveDate::from_ymd_opt(2026, 9, 15).unwrap()));
        assert!(sub.is_active(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()));
    }

    #[test]
    fn suspended_is_never_active() {
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let sub = subscription("suspended", end);
        assert!(!sub.is_active(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()));
    }

    #[test]
    fn days_remaining_floors_at_zero() {
        let end = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let sub = subscription("active", end);
        assert_eq!(
            sub.days_remaining(NaiveDate::from_ymd_opt(2026, 2, 27).unwrap()),
            2
        );
        assert_eq!(
            sub.days_remaining(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()),
            0
        );
    }
}
