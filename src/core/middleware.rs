use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::crm::error::CrmError;
use crate::crm::types::{CapabilityTier, UserRole};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The session resolved by the gateway in front of this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: i64,
    pub role: UserRole,
}

impl CallerContext {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, CrmError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CrmError::Unauthorized(format!("Missing {name} header")))
        };

        let user_id = header(USER_ID_HEADER)?
            .parse::<i64>()
            .map_err(|_| CrmError::Unauthorized(format!("Malformed {USER_ID_HEADER} header")))?;
        let role = header(USER_ROLE_HEADER)?
            .parse::<UserRole>()
            .map_err(|_| CrmError::Unauthorized(format!("Unknown role in {USER_ROLE_HEADER}")))?;

        Ok(Self { user_id, role })
    }

    /// Base-tier callers may only act on their own behalf.
    pub fn ensure_acting_as(&self, user_id: i64) -> Result<(), CrmError> {
        if self.role.tier() == CapabilityTier::Base && self.user_id != user_id {
            return Err(CrmError::Forbidden(format!(
                "{} {} cannot act for user {user_id}",
                self.role, self.user_id
            )));
        }
        Ok(())
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_context_from_headers() {
        let ctx = CallerContext::from_headers(&headers(&[
            (USER_ID_HEADER, "12"),
            (USER_ROLE_HEADER, "telecaller"),
        ]))
        .unwrap();
        assert_eq!(ctx.user_id, 12);
        assert_eq!(ctx.role, UserRole::Telecaller);
    }

    #[test]
    fn test_missing_or_bad_headers_are_unauthorized() {
        for map in [
            headers(&[]),
            headers(&[(USER_ID_HEADER, "12")]),
            headers(&[(USER_ID_HEADER, "abc"), (USER_ROLE_HEADER, "admin")]),
            headers(&[(USER_ID_HEADER, "12"), (USER_ROLE_HEADER, "superuser")]),
        ] {
            assert!(matches!(
                CallerContext::from_headers(&map),
                Err(CrmError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_base_tier_acts_only_for_itself() {
        let telecaller = CallerContext {
            user_id: 4,
            role: UserRole::Telecaller,
        };
        assert!(telecaller.ensure_acting_as(4).is_ok());
        assert!(matches!(
            telecaller.ensure_acting_as(5),
            Err(CrmError::Forbidden(_))
        ));

        let manager = CallerContext {
            user_id: 1,
            role: UserRole::Manager,
        };
        assert!(manager.ensure_acting_as(5).is_ok());
    }
}
