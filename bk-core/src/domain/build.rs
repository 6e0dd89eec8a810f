//! Build domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The build a local invocation runs
///
/// One per invocation, immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub number: u64,
    pub url: String,
}

impl Build {
    /// Creates build number `number` served from `endpoint`
    pub fn new(endpoint: &str, number: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            url: format!("{}/builds/{}", endpoint.trim_end_matches('/'), number),
        }
    }
}

/// Source-control and attribution fields shared by every job of a build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub commit: String,
    pub branch: String,
    pub tag: String,
    pub message: String,
    pub repository: String,
    pub organization_slug: String,
    pub pipeline_slug: String,
    pub creator_name: String,
    pub creator_email: String,
}
