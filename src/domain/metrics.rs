//! Cached per-user facts about the target site.
//!
//! Written by the external metrics-refresh job; read-only input here.

use crate::domain::{TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Basic-auth style credentials for the target's content API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WpCredentials {
    pub username: String,
    pub app_password: String,
}

/// Per-user cached site facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMetrics {
    pub user_id: UserId,
    pub site_url: String,
    pub domain: String,
    /// Whether the user has enabled content-API access for their site.
    pub wp_api_enabled: bool,
    pub wp_username: Option<String>,
    pub wp_app_password: Option<String>,
    pub authority_score: f64,
    pub refreshed_at: TimeMs,
}

impl DomainMetrics {
    /// Content-API credentials, present only when access is enabled and both
    /// parts are on file.
    pub fn wp_credentials(&self) -> Option<WpCredentials> {
        if !self.wp_api_enabled {
            return None;
        }
        match (&self.wp_username, &self.wp_app_password) {
            (Some(username), Some(app_password))
                if !username.is_empty() && !app_password.is_empty() =>
            {
                Some(WpCredentials {
                    username: username.clone(),
                    app_password: app_password.clone(),
                })
            }
            _ => None,
        }
    }
}
