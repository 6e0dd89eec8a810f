//! Meta-data API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use bk_core::dto::meta_data::{MetaDataExists, MetaDataKey, MetaDataValue, SetMetaData};
use serde_json::{Value, json};

use super::{AppState, parse_job_id, parse_json};
use crate::api::error::{ApiError, ApiResult};

/// POST /jobs/{id}/data/exists
pub async fn exists(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<MetaDataExists>> {
    parse_job_id(&id)?;
    let req: MetaDataKey = parse_json(&body)?;

    Ok(Json(MetaDataExists {
        exists: state.meta_data.exists(&req.key),
    }))
}

/// POST /jobs/{id}/data/set
pub async fn set(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    parse_job_id(&id)?;
    let req: SetMetaData = parse_json(&body)?;
    state.meta_data.set(req.key, req.value);

    Ok(Json(json!({})))
}

/// POST /jobs/{id}/data/get
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<MetaDataValue>> {
    parse_job_id(&id)?;
    let req: MetaDataKey = parse_json(&body)?;

    let value = state
        .meta_data
        .get(&req.key)
        .ok_or_else(|| ApiError::NotFound(format!("meta-data key {} not found", req.key)))?;

    Ok(Json(MetaDataValue { value }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestServer;
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_set_then_get_and_exists() {
        let server = TestServer::new();
        let token = server.register().await;
        let base = format!("/jobs/{}/data", Uuid::new_v4());

        let (_, body) = server
            .send(Method::POST, &format!("{}/exists", base), Some(&token), r#"{"key":"release"}"#)
            .await;
        assert_eq!(body, json!({"exists": false}));

        let (status, body) = server
            .send(
                Method::POST,
                &format!("{}/set", base),
                Some(&token),
                r#"{"key":"release","value":"v1"}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let (_, body) = server
            .send(Method::POST, &format!("{}/exists", base), Some(&token), r#"{"key":"release"}"#)
            .await;
        assert_eq!(body, json!({"exists": true}));

        let (status, body) = server
            .send(Method::POST, &format!("{}/get", base), Some(&token), r#"{"key":"release"}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"value": "v1"}));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_404() {
        let server = TestServer::new();
        let token = server.register().await;

        let (status, _) = server
            .send(
                Method::POST,
                &format!("/jobs/{}/data/get", Uuid::new_v4()),
                Some(&token),
                r#"{"key":"nope"}"#,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_requires_key_and_value() {
        let server = TestServer::new();
        let token = server.register().await;

        let (status, _) = server
            .send(
                Method::POST,
                &format!("/jobs/{}/data/set", Uuid::new_v4()),
                Some(&token),
                r#"{"key":"only"}"#,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!server.state.meta_data.exists("only"));
    }
}
