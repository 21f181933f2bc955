use chrono::NaiveDate;
use serde::Deserialize;

/// A project or group access token as returned by the GitLab API.
///
/// `expires_at` is nominally required, but the API can omit it; the
/// scraper treats a missing date as a record-level error, never as a
/// default.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub name: String,
    pub expires_at: Option<NaiveDate>,
}

/// A personal access token. Ownership is carried per token (`user_id`),
/// not per query scope.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonalAccessToken {
    pub name: String,
    pub user_id: u64,
    pub expires_at: Option<NaiveDate>,
}

/// Shared shape of the project/user/group detail endpoints; only the
/// display name is of interest.
#[derive(Debug, Deserialize)]
pub(crate) struct NamedEntity {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_parses_iso_date() {
        let token: AccessToken =
            serde_json::from_str(r#"{"name": "ci-deploy", "expires_at": "2026-12-01"}"#).unwrap();
        assert_eq!(token.name, "ci-deploy");
        assert_eq!(
            token.expires_at,
            Some(NaiveDate::from_ymd_opt(2026, 12, 1).unwrap())
        );
    }

    #[test]
    fn access_token_tolerates_null_expiry() {
        let token: AccessToken =
            serde_json::from_str(r#"{"name": "legacy", "expires_at": null}"#).unwrap();
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn personal_access_token_carries_user_id() {
        let token: PersonalAccessToken = serde_json::from_str(
            r#"{"name": "api", "user_id": 7, "expires_at": "2026-01-31", "scopes": ["api"]}"#,
        )
        .unwrap();
        assert_eq!(token.user_id, 7);
    }
}
