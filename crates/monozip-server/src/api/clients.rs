//! Client rule endpoints.
//!
//! Provides:
//! - GET /api/clients - Rules plus the custom entry
//! - POST /api/generate - Derive a password
//! - POST /api/add_client, /api/update_client, /api/delete_client - Admin-gated edits

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use monozip_core::ClientRule;
use serde::{Deserialize, Serialize};

use super::{check_admin, client_rule_error_response};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clients", get(list_clients))
        .route("/generate", post(generate_password))
        .route("/add_client", post(add_client))
        .route("/update_client", post(update_client))
        .route("/delete_client", post(delete_client))
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, alias = "clientKey")]
    pub client_key: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "customInput")]
    pub custom_input: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientRuleRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default, alias = "suffixRule")]
    pub suffix_rule: Option<String>,
    #[serde(default, alias = "adminPassword")]
    pub admin_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ManageResponse {
    pub success: bool,
    pub message: String,
    pub client: Option<ClientRule>,
    /// Set when an add request matched an existing rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// GET /api/clients
///
/// Falls back to the built-in rules (with `fallback: true`) when the store
/// cannot be read.
async fn list_clients(State(state): State<AppState>) -> Response {
    match state.service.list_available_or_defaults().await {
        Ok(available) => (StatusCode::OK, Json(available)).into_response(),
        Err(err) => client_rule_error_response(err),
    }
}

/// POST /api/generate
async fn generate_password(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let result = state
        .service
        .generate(
            request.client_key.as_deref().unwrap_or_default(),
            request.date.as_deref(),
            request.custom_input.as_deref(),
        )
        .await;

    match result {
        Ok(generated) => (StatusCode::OK, Json(generated)).into_response(),
        Err(err) => client_rule_error_response(err),
    }
}

/// POST /api/add_client
///
/// A name or prefix that is already registered returns the existing rule with
/// `success: false` and a notice, still with status 200.
async fn add_client(
    State(state): State<AppState>,
    Json(request): Json<ClientRuleRequest>,
) -> Response {
    if let Err(rejection) = check_admin(&state.admin_password, request.admin_password.as_deref()) {
        return rejection;
    }

    let result = state
        .service
        .add(
            request.name.as_deref().unwrap_or_default(),
            request.prefix.as_deref().unwrap_or_default(),
            request.suffix_rule.as_deref(),
        )
        .await;

    match result {
        Ok(outcome) => {
            let notice = (!outcome.created).then(|| "Reused the existing rule.".to_string());
            Json(ManageResponse {
                success: outcome.created,
                message: outcome.message,
                client: outcome.rule,
                notice,
            })
            .into_response()
        }
        Err(err) => client_rule_error_response(err),
    }
}

/// POST /api/update_client
async fn update_client(
    State(state): State<AppState>,
    Json(request): Json<ClientRuleRequest>,
) -> Response {
    if let Err(rejection) = check_admin(&state.admin_password, request.admin_password.as_deref()) {
        return rejection;
    }

    let result = state
        .service
        .update(
            request.key.as_deref().unwrap_or_default(),
            request.name.as_deref().unwrap_or_default(),
            request.prefix.as_deref().unwrap_or_default(),
            request.suffix_rule.as_deref(),
        )
        .await;

    match result {
        Ok(outcome) => Json(ManageResponse {
            success: outcome.updated,
            message: outcome.message,
            client: Some(outcome.rule),
            notice: None,
        })
        .into_response(),
        Err(err) => client_rule_error_response(err),
    }
}

/// POST /api/delete_client
async fn delete_client(
    State(state): State<AppState>,
    Json(request): Json<ClientRuleRequest>,
) -> Response {
    if let Err(rejection) = check_admin(&state.admin_password, request.admin_password.as_deref()) {
        return rejection;
    }

    match state
        .service
        .delete(request.key.as_deref().unwrap_or_default())
        .await
    {
        Ok(outcome) => Json(ManageResponse {
            success: outcome.deleted,
            message: outcome.message,
            client: Some(outcome.rule),
            notice: None,
        })
        .into_response(),
        Err(err) => client_rule_error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ADMIN_PASSWORD, file_state};
    use axum::body::to_bytes;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    async fn read_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let body: Value = serde_json::from_slice(&body_bytes).expect("json body");
        (status, body)
    }

    fn add_request(name: &str, prefix: &str, admin: Option<&str>) -> ClientRuleRequest {
        ClientRuleRequest {
            name: Some(name.into()),
            prefix: Some(prefix.into()),
            admin_password: admin.map(Into::into),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn list_clients_returns_defaults_and_custom_entry() {
        let dir = TempDir::new().expect("temp dir");
        let (status, body) = read_json(list_clients(State(file_state(&dir))).await).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fallback"], json!(false));
        let keys: Vec<&str> = body["clients"]
            .as_array()
            .expect("clients")
            .iter()
            .map(|client| client["key"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(keys, vec!["am", "af", "custom"]);
        assert_eq!(body["clients"][0]["rule_description"], "AMS_KTC + MMDD");
    }

    #[tokio::test]
    async fn list_clients_falls_back_when_file_is_corrupt() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("clients.json");
        std::fs::write(&path, "not json").expect("write");

        let (status, body) = read_json(list_clients(State(file_state(&dir))).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fallback"], json!(true));
        assert_eq!(body["clients"].as_array().expect("clients").len(), 3);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "not json");
    }

    #[tokio::test]
    async fn generate_accepts_camel_case_fields() {
        let dir = TempDir::new().expect("temp dir");
        let request: GenerateRequest =
            serde_json::from_value(json!({"clientKey": "am", "date": "2024-03-05"}))
                .expect("request");

        let (status, body) =
            read_json(generate_password(State(file_state(&dir)), Json(request)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["password"], "AMS_KTC0305");
        assert_eq!(body["date"], "2024-03-05");
    }

    #[tokio::test]
    async fn generate_custom_without_date_returns_text() {
        let dir = TempDir::new().expect("temp dir");
        let request: GenerateRequest =
            serde_json::from_value(json!({"client_key": "custom", "custom_input": "  hello "}))
                .expect("request");

        let (status, body) =
            read_json(generate_password(State(file_state(&dir)), Json(request)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["password"], "hello");
        assert!(body["date"].is_null());
    }

    #[tokio::test]
    async fn generate_reports_input_errors() {
        let dir = TempDir::new().expect("temp dir");
        let state = file_state(&dir);

        let (status, body) =
            read_json(generate_password(State(state.clone()), Json(GenerateRequest::default())).await)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let bad_date = GenerateRequest {
            client_key: Some("am".into()),
            date: Some("05/03/2024".into()),
            custom_input: None,
        };
        let (status, body) =
            read_json(generate_password(State(state.clone()), Json(bad_date)).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(
            body["message"]
                .as_str()
                .unwrap_or_default()
                .contains("YYYY-MM-DD")
        );

        let unknown = GenerateRequest {
            client_key: Some("zz".into()),
            ..Default::default()
        };
        let (status, _) = read_json(generate_password(State(state), Json(unknown)).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn add_client_requires_admin_password() {
        let dir = TempDir::new().expect("temp dir");
        let state = file_state(&dir);

        let (status, _) =
            read_json(add_client(State(state.clone()), Json(add_request("Acme", "ACM", None))).await)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = read_json(
            add_client(
                State(state.clone()),
                Json(add_request("Acme", "ACM", Some("wrong"))),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let listed = state.service.list_available().await.expect("list");
        assert_eq!(listed.len(), 3);
    }

    #[tokio::test]
    async fn add_client_reuses_existing_rule() {
        let dir = TempDir::new().expect("temp dir");
        let state = file_state(&dir);

        let (status, body) = read_json(
            add_client(
                State(state.clone()),
                Json(add_request("Acme", "ACM", Some(ADMIN_PASSWORD))),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["client"]["key"], "acme");
        assert!(body.get("notice").is_none());

        let (status, body) = read_json(
            add_client(
                State(state),
                Json(add_request("ACME", "NEW", Some(ADMIN_PASSWORD))),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["client"]["key"], "acme");
        assert_eq!(body["message"], "ACME is already registered.");
        assert!(body["notice"].is_string());
    }

    #[tokio::test]
    async fn update_client_reports_conflicts_with_409() {
        let dir = TempDir::new().expect("temp dir");
        let state = file_state(&dir);

        let request: ClientRuleRequest = serde_json::from_value(json!({
            "key": "am",
            "name": "afさま",
            "prefix": "AMS_KTC",
            "adminPassword": ADMIN_PASSWORD,
        }))
        .expect("request");
        let (status, body) = read_json(update_client(State(state.clone()), Json(request)).await).await;
        assert_eq!(status, StatusCode::CONFLICT, "body: {}", body);

        let request: ClientRuleRequest = serde_json::from_value(json!({
            "key": "am",
            "name": "AM",
            "prefix": "AMS_NEW",
            "suffixRule": "MMDD of delivery",
            "admin_password": ADMIN_PASSWORD,
        }))
        .expect("request");
        let (status, body) = read_json(update_client(State(state), Json(request)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["client"]["key"], "am");
        assert_eq!(body["client"]["prefix"], "AMS_NEW");
        assert_eq!(body["client"]["suffix_rule"], "MMDD of delivery");
    }

    #[tokio::test]
    async fn delete_client_protects_custom_and_persists() {
        let dir = TempDir::new().expect("temp dir");
        let state = file_state(&dir);

        let custom = ClientRuleRequest {
            key: Some("custom".into()),
            admin_password: Some(ADMIN_PASSWORD.into()),
            ..Default::default()
        };
        let (status, body) = read_json(delete_client(State(state.clone()), Json(custom)).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Custom cannot be deleted.");

        let af = ClientRuleRequest {
            key: Some("af".into()),
            admin_password: Some(ADMIN_PASSWORD.into()),
            ..Default::default()
        };
        let (status, body) = read_json(delete_client(State(state.clone()), Json(af)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["client"]["prefix"], "KTC_SSP");

        let again = ClientRuleRequest {
            key: Some("af".into()),
            admin_password: Some(ADMIN_PASSWORD.into()),
            ..Default::default()
        };
        let (status, _) = read_json(delete_client(State(state), Json(again)).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
