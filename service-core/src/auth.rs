//! Principal extraction for role-gated endpoints.
//!
//! The upstream gateway authenticates the user and forwards identity as
//! `X-User-Id` / `X-User-Role` headers. Services never reach into ambient
//! session state: the extracted [`Principal`] is threaded explicitly through
//! every state-machine operation.

use crate::error::AppError;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

/// Platform role of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Syndic,
    Resident,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Syndic => "syndic",
            Role::Resident => "resident",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "syndic" => Some(Role::Syndic),
            "resident" => Some(Role::Resident),
            _ => None,
        }
    }
}

/// The authenticated actor behind a request.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admin, or the syndic identified by `syndic_id`.
    pub fn can_act_for_syndic(&self, syndic_id: Uuid) -> bool {
        self.is_admin() || (self.role == Role::Syndic && self.user_id == syndic_id)
    }

    /// Fail unless the principal holds the given role (admin passes everywhere).
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.role == role || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Ownership(format!(
                "{} role required",
                role.as_str()
            )))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Ownership("Missing X-User-Id header".to_string()))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Validation("X-User-Id must be a UUID".to_string()))?;

        let role = parts
            .headers
            .get("X-User-Role")
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .ok_or_else(|| {
                AppError::Ownership("Missing or unknown X-User-Role header".to_string())
            })?;

        let span = tracing::Span::current();
        span.record("user_id", user_id.to_string().as_str());
        span.record("role", role.as_str());

        Ok(Principal::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_act_for_any_syndic() {
        let admin = Principal::new(Uuid::new_v4(), Role::Admin);
        assert!(admin.can_act_for_syndic(Uuid::new_v4()));
    }

    #[test]
    fn syndic_can_only_act_for_self() {
        let id = Uuid::new_v4();
        let syndic = Principal::new(id, Role::Syndic);
        assert!(syndic.can_act_for_syndic(id));
        assert!(!syndic.can_act_for_syndic(Uuid::new_v4()));
    }

    #[test]
    fn resident_fails_syndic_requirement() {
        let resident = Principal::new(Uuid::new_v4(), Role::Resident);
        assert!(resident.require(Role::Syndic).is_err());
        assert!(resident.require(Role::Resident).is_ok());
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse("SYNDIC"), Some(Role::Syndic));
        assert_eq!(Role::parse("Resident"), Some(Role::Resident));
        assert_eq!(Role::parse("root"), None);
    }
}
