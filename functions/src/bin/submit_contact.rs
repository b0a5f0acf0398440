//! Contact Submission Lambda - Stores contact-form submissions in Supabase.
//!
//! Validates the form payload, inserts one row into `contacts`, and sends a
//! best-effort notification email via Resend when configured. A duplicate
//! email is answered politely instead of surfacing a constraint error.

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use shared::{error_response, is_unique_violation, is_valid_email, json_response, preflight_response, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Contact form payload.
#[derive(Debug, Deserialize)]
struct ContactRequest {
    name: Option<String>,
    email: Option<String>,
    message: Option<String>,
    company: Option<String>,
    phone: Option<String>,
}

/// Successful submission response.
#[derive(Debug, Serialize)]
struct ContactResponse {
    status: bool,
    message: String,
    data: ContactData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactData {
    name: String,
    email: String,
    submitted_at: String,
}

/// Validated form fields.
#[derive(Debug)]
struct ContactFields {
    name: String,
    email: String,
    message: String,
    company: Option<String>,
    phone: Option<String>,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    http_client: reqwest::Client,
    config: Config,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|_| "SUPABASE_DB_URL not set")?;
        let db_pool = shared::create_pool(&config).await?;

        Ok(Self {
            db_pool,
            http_client: reqwest::Client::new(),
            config,
        })
    }

    /// Notify the site owner about a new submission. Best-effort: a lost
    /// notification must never fail the submission itself.
    async fn send_notification(&self, fields: &ContactFields) {
        let (Some(api_key), Some(to)) = (
            self.config.resend_api_key.as_deref(),
            self.config.contact_notify_email.as_deref(),
        ) else {
            return;
        };

        let payload = serde_json::json!({
            "from": "Linguawaves Website <no-reply@linguawaves.com>",
            "to": [to],
            "subject": format!("New contact submission from {}", fields.name),
            "text": format!(
                "Name: {}\nEmail: {}\nCompany: {}\nPhone: {}\n\n{}",
                fields.name,
                fields.email,
                fields.company.as_deref().unwrap_or("-"),
                fields.phone.as_deref().unwrap_or("-"),
                fields.message,
            ),
        });

        let result = self
            .http_client
            .post("https://api.resend.com/emails")
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Notification email sent for {}", fields.email);
            }
            Ok(response) => {
                warn!("Resend returned {} for {}", response.status(), fields.email);
            }
            Err(e) => {
                warn!("Failed to send notification email: {}", e);
            }
        }
    }
}

/// Check required fields and email shape.
fn validate_contact(request: &ContactRequest) -> Result<ContactFields, String> {
    let name = request.name.as_deref().unwrap_or("").trim();
    let email = request.email.as_deref().unwrap_or("").trim();
    let message = request.message.as_deref().unwrap_or("").trim();

    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err("name, email and message are required".to_string());
    }

    if !is_valid_email(email) {
        return Err("Invalid email".to_string());
    }

    Ok(ContactFields {
        name: name.to_string(),
        email: email.to_string(),
        message: message.to_string(),
        company: request.company.clone(),
        phone: request.phone.clone(),
    })
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    match event.method().as_str() {
        "OPTIONS" => return preflight_response(),
        "POST" => {}
        _ => return error_response(405, "Use POST"),
    }

    let request: ContactRequest = match serde_json::from_slice(event.body().as_ref()) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(400, format!("Invalid request body: {}", e)),
    };

    let fields = match validate_contact(&request) {
        Ok(fields) => fields,
        Err(message) => return error_response(400, message),
    };

    let submitted_at = Utc::now();
    let insert = sqlx::query(
        r#"
        INSERT INTO contacts (name, email, message, company, phone, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&fields.name)
    .bind(&fields.email)
    .bind(&fields.message)
    .bind(&fields.company)
    .bind(&fields.phone)
    .bind(submitted_at)
    .execute(&state.db_pool)
    .await;

    if let Err(e) = insert {
        if is_unique_violation(&e) {
            info!("Duplicate contact submission: {}", fields.email);
            return error_response(400, "Contact already exists. We'll be in touch.");
        }
        error!("Contact insert failed: {}", e);
        return error_response(500, "Failed to save submission");
    }

    info!("Contact stored: {}", fields.email);

    state.send_notification(&fields).await;

    json_response(
        200,
        &ContactResponse {
            status: true,
            message: "Contact stored successfully".to_string(),
            data: ContactData {
                name: fields.name,
                email: fields.email,
                submitted_at: submitted_at.to_rfc3339(),
            },
        },
    )
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

    fn request(name: Option<&str>, email: Option<&str>, message: Option<&str>) -> ContactRequest {
        ContactRequest {
            name: name.map(String::from),
            email: email.map(String::from),
            message: message.map(String::from),
            company: None,
            phone: None,
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = validate_contact(&request(None, Some("a@b.co"), Some("hi"))).unwrap_err();
        assert_eq!(err, "name, email and message are required");

        assert!(validate_contact(&request(Some("Ana"), None, Some("hi"))).is_err());
        assert!(validate_contact(&request(Some("Ana"), Some("a@b.co"), None)).is_err());
        assert!(validate_contact(&request(Some("  "), Some("a@b.co"), Some("hi"))).is_err());
    }

    #[test]
    fn test_invalid_email_rejected() {
        let err =
            validate_contact(&request(Some("Ana"), Some("not-an-email"), Some("hi"))).unwrap_err();
        assert_eq!(err, "Invalid email");
    }

    #[test]
    fn test_valid_submission_accepted() {
        let fields =
            validate_contact(&request(Some(" Ana "), Some("ana@example.com"), Some("hello")))
                .unwrap();
        assert_eq!(fields.name, "Ana");
        assert_eq!(fields.email, "ana@example.com");
        assert_eq!(fields.message, "hello");
    }
}
