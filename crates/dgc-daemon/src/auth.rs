//! Trust fabric: service authentication and governance RBAC.
//!
//! Two orthogonal gates run at endpoint entry, before any work:
//!
//! - **Service auth**: when a shared token is configured, protected requests
//!   must carry `x-service-token` exactly equal to it. Comparison is
//!   constant-time. Absent or mismatched tokens yield 401
//!   `unauthorized_service`; an unset token permits all.
//! - **Governance RBAC**: governance-only mutations require
//!   `x-governance-role` (normalized: trimmed, lowercased) in the configured
//!   allow set. When `x-governance-actor` is present it must equal the
//!   body's actor field. Violations yield 403 `forbidden`.

use axum::http::{HeaderMap, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use dgc_core::trust::{normalize_role, RoleSet};

use crate::http::ApiError;

/// Header carrying the shared service token.
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// Header asserting the caller's governance role.
pub const GOVERNANCE_ROLE_HEADER: &str = "x-governance-role";

/// Header asserting the caller's governance actor identity.
pub const GOVERNANCE_ACTOR_HEADER: &str = "x-governance-actor";

/// The service-auth gate configured from `SERVICE_AUTH_TOKEN`.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    token: Option<SecretString>,
}

impl ServiceAuth {
    /// Builds the gate; `None` permits all requests.
    #[must_use]
    pub const fn new(token: Option<SecretString>) -> Self {
        Self { token }
    }

    /// Enforces the token on a protected request.
    ///
    /// # Errors
    ///
    /// Returns 401 `unauthorized_service` when the header is absent or does
    /// not match the configured token.
    pub fn require(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(expected) = &self.token else {
            return Ok(());
        };
        let presented = headers
            .get(SERVICE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing service token"))?;

        let expected = expected.expose_secret().as_bytes();
        if presented.as_bytes().ct_eq(expected).into() {
            Ok(())
        } else {
            Err(unauthorized("service token mismatch"))
        }
    }
}

fn unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized_service").with_message(message)
}

/// Enforces the governance gate for a high-trust mutation.
///
/// `body_actor` is the actor named in the request body (`assignedBy`,
/// `resolvedBy`, or `actor`); when the `x-governance-actor` header is
/// present the two must agree.
///
/// # Errors
///
/// Returns 403 `forbidden` when the role header is missing, the normalized
/// role is not in the allow set, or the actor headers disagree.
pub fn require_governance(
    headers: &HeaderMap,
    allowed: &RoleSet,
    body_actor: Option<&str>,
) -> Result<(), ApiError> {
    let role = headers
        .get(GOVERNANCE_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(normalize_role)
        .unwrap_or_default();

    if role.is_empty() {
        return Err(forbidden("missing governance role"));
    }
    if !allowed.allows(&role) {
        return Err(forbidden(&format!("role '{role}' is not permitted")));
    }

    if let Some(asserted) = headers
        .get(GOVERNANCE_ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        let Some(body_actor) = body_actor else {
            return Err(forbidden("governance actor asserted but no body actor"));
        };
        if asserted != body_actor {
            return Err(forbidden("governance actor does not match body actor"));
        }
    }

    Ok(())
}

fn forbidden(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden").with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn unset_token_permits_all() {
        let auth = ServiceAuth::new(None);
        assert!(auth.require(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn matching_token_passes() {
        let auth = ServiceAuth::new(Some(SecretString::from("secret-1".to_string())));
        let ok = headers(&[(SERVICE_TOKEN_HEADER, "secret-1")]);
        assert!(auth.require(&ok).is_ok());
    }

    #[test]
    fn missing_or_wrong_token_rejected() {
        let auth = ServiceAuth::new(Some(SecretString::from("secret-1".to_string())));
        assert_eq!(
            auth.require(&HeaderMap::new()).unwrap_err().status(),
            StatusCode::UNAUTHORIZED
        );
        let wrong = headers(&[(SERVICE_TOKEN_HEADER, "Secret-1")]);
        assert_eq!(
            auth.require(&wrong).unwrap_err().code(),
            "unauthorized_service"
        );
    }

    #[test]
    fn governance_role_is_normalized() {
        let allowed = RoleSet::parse("ops_admin,admin");
        let map = headers(&[(GOVERNANCE_ROLE_HEADER, "  OPS_ADMIN ")]);
        assert!(require_governance(&map, &allowed, None).is_ok());
    }

    #[test]
    fn governance_rejects_unlisted_role() {
        let allowed = RoleSet::parse("ops_admin");
        let map = headers(&[(GOVERNANCE_ROLE_HEADER, "ops_agent")]);
        let err = require_governance(&map, &allowed, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn governance_rejects_missing_role() {
        let allowed = RoleSet::parse("*");
        assert!(require_governance(&HeaderMap::new(), &allowed, None).is_err());
    }

    #[test]
    fn actor_consistency_enforced() {
        let allowed = RoleSet::parse("admin");
        let map = headers(&[
            (GOVERNANCE_ROLE_HEADER, "admin"),
            (GOVERNANCE_ACTOR_HEADER, "alice"),
        ]);
        assert!(require_governance(&map, &allowed, Some("alice")).is_ok());
        assert!(require_governance(&map, &allowed, Some("bob")).is_err());
        assert!(require_governance(&map, &allowed, None).is_err());
    }
}
