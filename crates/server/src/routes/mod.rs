use serde::Deserialize;

use crate::error::ApiError;

pub mod comments;
pub mod config;
pub mod health;
pub mod items;
pub mod orders;
pub mod tags;

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u64,
    /// `0` means no limit.
    #[serde(default)]
    pub limit: u64,
}

/// Parses a comma separated id list such as `1,2,3`. Blank entries are skipped.
pub(crate) fn parse_id_list(raw: &str, field: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| ApiError::BadRequest(format!("Invalid id {part:?} in {field}")))
        })
        .collect()
}
