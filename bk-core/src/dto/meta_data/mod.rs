//! Meta-data DTOs

use serde::{Deserialize, Serialize};

/// Body of `POST /jobs/{id}/data/set`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMetaData {
    pub key: String,
    pub value: String,
}

/// Body of `POST /jobs/{id}/data/exists` and `POST /jobs/{id}/data/get`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataKey {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataExists {
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataValue {
    pub value: String,
}
