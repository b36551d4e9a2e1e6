use std::collections::BTreeMap;

use db::types::MAX_APPRAISAL;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub const CURRENT_CONFIG_VERSION: &str = "v1";

/// Permission granting every other permission.
pub const WILDCARD_PERMISSION: &str = "*";

const DAY_SECS: u64 = 60 * 60 * 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct AppraiseConfig {
    /// Seconds between two auto-appraise sweeps.
    #[serde(alias = "purgeIntervalSecs")]
    pub purge_interval_secs: u64,
    /// How long an order may stay completed before it is appraised for the owner.
    #[serde(alias = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(alias = "defaultScore")]
    pub default_score: i32,
}

impl Default for AppraiseConfig {
    fn default() -> Self {
        Self {
            purge_interval_secs: 60 * 60,
            timeout_secs: 7 * DAY_SECS,
            default_score: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, TS)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "configVersion")]
    pub config_version: String,
    /// Overrides the SQLite file in the asset directory.
    #[serde(alias = "databaseUrl")]
    pub database_url: Option<String>,
    pub appraise: AppraiseConfig,
    /// Role name to the permissions it grants.
    pub permissions: BTreeMap<String, Vec<String>>,
    /// User id to role name. Unlisted users get `default_role`.
    pub users: BTreeMap<i64, String>,
    #[serde(alias = "defaultRole")]
    pub default_role: String,
}

fn permissions(list: &[&str]) -> Vec<String> {
    list.iter().map(|permission| permission.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert("admin".to_string(), permissions(&[WILDCARD_PERMISSION]));
        roles.insert(
            "repairer".to_string(),
            permissions(&[
                "order.view",
                "order.viewfix",
                "order.selfassign",
                "order.release",
                "order.complete",
                "order.report",
                "order.hold",
                "comment.create",
                "comment.view",
                "comment.delete",
                "tag.view",
                "item.consume",
            ]),
        );
        roles.insert(
            "user".to_string(),
            permissions(&[
                "order.view",
                "order.create",
                "order.update",
                "order.cancel",
                "order.appraise",
                "comment.create",
                "comment.view",
                "comment.delete",
                "tag.view",
            ]),
        );

        Self {
            config_version: CURRENT_CONFIG_VERSION.to_string(),
            database_url: None,
            appraise: AppraiseConfig::default(),
            permissions: roles,
            users: BTreeMap::new(),
            default_role: "user".to_string(),
        }
    }
}

impl Config {
    pub fn from_raw(raw_config: &str) -> Self {
        match serde_json::from_str::<Config>(raw_config) {
            Ok(config) => config.normalized(),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse config (line {}, column {}): {}, using default",
                    e.line(),
                    e.column(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.config_version = CURRENT_CONFIG_VERSION.to_string();
        if !(1..=MAX_APPRAISAL).contains(&self.appraise.default_score) {
            tracing::warn!(
                score = self.appraise.default_score,
                "Default appraisal score out of range, clamping"
            );
            self.appraise.default_score = self.appraise.default_score.clamp(1, MAX_APPRAISAL);
        }
        if self.appraise.purge_interval_secs == 0 {
            self.appraise.purge_interval_secs = AppraiseConfig::default().purge_interval_secs;
        }
        if self
            .database_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            self.database_url = None;
        }
        self
    }

    pub fn role_of(&self, user_id: i64) -> &str {
        self.users
            .get(&user_id)
            .map(String::as_str)
            .unwrap_or(self.default_role.as_str())
    }

    /// Whether the user's role grants `permission`, directly or via `*`.
    pub fn has_permission(&self, user_id: i64, permission: &str) -> bool {
        self.permissions
            .get(self.role_of(user_id))
            .is_some_and(|granted| {
                granted
                    .iter()
                    .any(|p| p == permission || p == WILDCARD_PERMISSION)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = Config::from_raw(r#"{ "appraise": { "timeout_secs": 60 } }"#);
        assert_eq!(config.appraise.timeout_secs, 60);
        assert_eq!(config.appraise.default_score, 3);
        assert_eq!(config.appraise.purge_interval_secs, 3600);
        assert_eq!(config.config_version, CURRENT_CONFIG_VERSION);
        assert!(config.permissions.contains_key("admin"));
    }

    #[test]
    fn invalid_json_uses_defaults() {
        let config = Config::from_raw("{ not json");
        assert_eq!(config.appraise, AppraiseConfig::default());
    }

    #[test]
    fn normalization_clamps_score_and_interval() {
        let config = Config::from_raw(
            r#"{ "appraise": { "defaultScore": 9, "purgeIntervalSecs": 0 }, "database_url": " " }"#,
        );
        assert_eq!(config.appraise.default_score, MAX_APPRAISAL);
        assert_eq!(config.appraise.purge_interval_secs, 3600);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn permissions_resolve_through_roles() {
        let mut config = Config::default();
        config.users.insert(1, "admin".to_string());
        config.users.insert(7, "repairer".to_string());

        assert!(config.has_permission(1, "order.delete"));
        assert!(config.has_permission(7, "order.complete"));
        assert!(!config.has_permission(7, "order.assign"));
        // Unlisted users fall back to the default role.
        assert!(config.has_permission(42, "order.create"));
        assert!(!config.has_permission(42, "order.complete"));

        config.users.insert(9, "ghost".to_string());
        assert!(!config.has_permission(9, "order.view"));
    }
}
