//! HubSpot Sync Lambda - Pushes website leads into the HubSpot CRM.
//!
//! Creates a contact via the HubSpot v3 objects API and records every attempt
//! in the `hubspot_syncs` audit table. A 409 from HubSpot means the contact
//! already exists and is reported as a success to the caller, not an error.

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{error_response, is_valid_email, json_response, preflight_response, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const HUBSPOT_CONTACTS_URL: &str = "https://api.hubapi.com/crm/v3/objects/contacts";
const LEAD_SOURCE: &str = "Website - Linguawaves";

/// Lead payload from the website.
#[derive(Debug, Deserialize)]
struct SyncRequest {
    email: Option<String>,
    firstname: Option<String>,
    lastname: Option<String>,
    company: Option<String>,
    phone: Option<String>,
    website: Option<String>,
    message: Option<String>,
}

/// Successful sync response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    status: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    http_client: reqwest::Client,
    hubspot_token: Option<String>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|_| "SUPABASE_DB_URL not set")?;
        let db_pool = shared::create_pool(&config).await?;

        Ok(Self {
            db_pool,
            http_client: reqwest::Client::new(),
            hubspot_token: config.hubspot_token,
        })
    }

    /// Append one audit row per sync attempt. Best-effort: a failed audit
    /// write must never mask the outcome of the sync itself.
    async fn log_sync(
        &self,
        email: &str,
        sync_status: &str,
        contact_id: Option<&str>,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO hubspot_syncs (email, hubspot_contact_id, sync_status, error_message, synced_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(email)
        .bind(contact_id)
        .bind(sync_status)
        .bind(error_message)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to write sync audit row: {}", e);
        }
    }
}

/// Check required fields and email shape.
fn validate_sync(request: &SyncRequest) -> Result<(String, String), String> {
    let email = request.email.as_deref().unwrap_or("").trim();
    let firstname = request.firstname.as_deref().unwrap_or("").trim();

    if email.is_empty() || firstname.is_empty() {
        return Err("email & firstname are required".to_string());
    }

    if !is_valid_email(email) {
        return Err("Invalid email".to_string());
    }

    Ok((email.to_string(), firstname.to_string()))
}

/// Build the HubSpot contact-creation payload, tagging the lead source.
fn build_hubspot_payload(email: &str, firstname: &str, request: &SyncRequest) -> Value {
    serde_json::json!({
        "properties": {
            "email": email,
            "firstname": firstname,
            "lastname": request.lastname.as_deref().unwrap_or(""),
            "company": request.company.as_deref().unwrap_or(""),
            "phone": request.phone.as_deref().unwrap_or(""),
            "website": request.website.as_deref().unwrap_or(""),
            "message": request.message.as_deref().unwrap_or(""),
            "hs_lead_source": LEAD_SOURCE,
        }
    })
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    match event.method().as_str() {
        "OPTIONS" => return preflight_response(),
        "POST" => {}
        _ => return error_response(405, "Use POST"),
    }

    let request: SyncRequest = match serde_json::from_slice(event.body().as_ref()) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(400, format!("Invalid request body: {}", e)),
    };

    let (email, firstname) = match validate_sync(&request) {
        Ok(fields) => fields,
        Err(message) => return error_response(400, message),
    };

    let Some(token) = state.hubspot_token.as_deref() else {
        error!("Missing HUBSPOT_PRIVATE_TOKEN");
        state
            .log_sync(&email, "failed", None, Some("Missing HUBSPOT_PRIVATE_TOKEN"))
            .await;
        return error_response(500, "HubSpot sync failed");
    };

    let payload = build_hubspot_payload(&email, &firstname, &request);

    let response = match state
        .http_client
        .post(HUBSPOT_CONTACTS_URL)
        .bearer_auth(token)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("HubSpot request failed: {}", e);
            state
                .log_sync(&email, "failed", None, Some(&e.to_string()))
                .await;
            return error_response(500, "HubSpot sync failed");
        }
    };

    let status = response.status();
    let result: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        let contact_id = result["id"].as_str().map(String::from);
        state
            .log_sync(&email, "success", contact_id.as_deref(), None)
            .await;
        info!("HubSpot synced: {}", email);

        return json_response(
            200,
            &SyncResponse {
                status: true,
                message: "Synced to HubSpot".to_string(),
                contact_id,
                email: None,
            },
        );
    }

    // Duplicate contact: not a client error, the lead is already in the CRM.
    if status == reqwest::StatusCode::CONFLICT {
        let hubspot_message = result["message"].as_str();
        state
            .log_sync(&email, "duplicate", None, hubspot_message)
            .await;
        info!("HubSpot duplicate: {}", email);

        return json_response(
            200,
            &SyncResponse {
                status: true,
                message: "Contact already exists in HubSpot".to_string(),
                contact_id: None,
                email: Some(email),
            },
        );
    }

    let hubspot_message = result["message"]
        .as_str()
        .unwrap_or("HubSpot sync failed")
        .to_string();
    error!("HubSpot error {}: {}", status, hubspot_message);
    state
        .log_sync(&email, "failed", None, Some(&hubspot_message))
        .await;

    error_response(500, "HubSpot sync failed")
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: Option<&str>, firstname: Option<&str>) -> SyncRequest {
        SyncRequest {
            email: email.map(String::from),
            firstname: firstname.map(String::from),
            lastname: None,
            company: None,
            phone: None,
            website: None,
            message: None,
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = validate_sync(&request(None, Some("Ana"))).unwrap_err();
        assert_eq!(err, "email & firstname are required");
        assert!(validate_sync(&request(Some("a@b.co"), None)).is_err());
        assert!(validate_sync(&request(Some(""), Some("Ana"))).is_err());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let err = validate_sync(&request(Some("nope"), Some("Ana"))).unwrap_err();
        assert_eq!(err, "Invalid email");
    }

    #[test]
    fn test_payload_tags_lead_source_and_defaults_optionals() {
        let mut req = request(Some("ana@example.com"), Some("Ana"));
        req.company = Some("Acme".to_string());

        let payload = build_hubspot_payload("ana@example.com", "Ana", &req);
        let props = &payload["properties"];
        assert_eq!(props["email"], "ana@example.com");
        assert_eq!(props["firstname"], "Ana");
        assert_eq!(props["company"], "Acme");
        assert_eq!(props["lastname"], "");
        assert_eq!(props["hs_lead_source"], "Website - Linguawaves");
    }
}
