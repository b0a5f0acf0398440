//! Cal.com Webhook Lambda - Mirrors booking lifecycle events into Supabase.
//!
//! Verifies the `x-cal-signature-256` HMAC before touching the payload, then
//! dispatches on the trigger event: created bookings are inserted, reschedules
//! and cancellations update the row keyed by the Cal.com booking id.
//!
//! Unknown events are acknowledged with 200 so Cal.com does not retry them.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::{header, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SIGNATURE_HEADER: &str = "x-cal-signature-256";

/// Webhook envelope from Cal.com.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    trigger_event: String,
    payload: BookingPayload,
}

/// Booking fields we care about; Cal.com sends many more.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookingPayload {
    id: i64,
    #[serde(default)]
    attendees: Vec<Attendee>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Attendee {
    name: Option<String>,
    email: Option<String>,
}

/// Acknowledgement body returned to Cal.com.
#[derive(Debug, Serialize)]
struct WebhookResponse {
    status: bool,
    message: String,
    event: String,
}

/// Application state
struct AppState {
    db_pool: PgPool,
    webhook_secret: Option<String>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|_| "SUPABASE_DB_URL not set")?;
        let db_pool = shared::create_pool(&config).await?;

        Ok(Self {
            db_pool,
            webhook_secret: config.calcom_webhook_secret,
        })
    }

    async fn booking_created(&self, booking: &BookingPayload) -> shared::Result<()> {
        let attendee = booking.attendees.first();

        sqlx::query(
            r#"
            INSERT INTO bookings
                (calcom_booking_id, attendee_name, attendee_email, start_time, end_time, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'confirmed', $6)
            "#,
        )
        .bind(booking.id)
        .bind(attendee.and_then(|a| a.name.as_deref()))
        .bind(attendee.and_then(|a| a.email.as_deref()))
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        info!("Booking created: {}", booking.id);
        Ok(())
    }

    async fn booking_rescheduled(&self, booking: &BookingPayload) -> shared::Result<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET start_time = $1, end_time = $2, status = 'rescheduled', updated_at = $3
            WHERE calcom_booking_id = $4
            "#,
        )
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(Utc::now())
        .bind(booking.id)
        .execute(&self.db_pool)
        .await?;

        info!("Booking rescheduled: {}", booking.id);
        Ok(())
    }

    async fn booking_cancelled(&self, booking: &BookingPayload) -> shared::Result<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancellation_reason = $1, updated_at = $2
            WHERE calcom_booking_id = $3
            "#,
        )
        .bind(booking.cancellation_reason.as_deref())
        .bind(Utc::now())
        .bind(booking.id)
        .execute(&self.db_pool)
        .await?;

        info!("Booking cancelled: {}", booking.id);
        Ok(())
    }
}

/// Verify the HMAC-SHA256 hex digest of the raw body against the header value.
fn verify_signature(secret: &str, body: &[u8], provided: &str) -> bool {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected == provided
}

/// Webhook responses carry no CORS headers; Cal.com calls server-to-server.
fn respond<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?)
}

fn reject(status: u16, error: &str) -> Result<Response<Body>, Error> {
    respond(status, &serde_json::json!({ "status": false, "error": error }))
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    if event.method().as_str() != "POST" {
        return reject(405, "Use POST");
    }

    // The body is untrusted until the signature checks out; no parsing before this.
    let signature = header(&event, SIGNATURE_HEADER);
    let (Some(secret), Some(signature)) = (state.webhook_secret.as_deref(), signature) else {
        error!("Missing signing secret or signature");
        return reject(401, "Unauthorized");
    };

    let body = event.body().as_ref();
    if !verify_signature(secret, body, signature) {
        error!("Invalid webhook signature");
        return reject(401, "Invalid signature");
    }

    let webhook: WebhookEvent = match serde_json::from_slice(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Failed to parse webhook payload: {}", e);
            return reject(500, "Webhook processing failed");
        }
    };

    info!(
        "Cal.com event: {} booking {}",
        webhook.trigger_event, webhook.payload.id
    );

    let outcome = match webhook.trigger_event.as_str() {
        "BOOKING_CREATED" => state.booking_created(&webhook.payload).await,
        "BOOKING_RESCHEDULED" => state.booking_rescheduled(&webhook.payload).await,
        "BOOKING_CANCELLED" => state.booking_cancelled(&webhook.payload).await,
        other => {
            warn!("Unhandled event: {}", other);
            Ok(())
        }
    };

    if let Err(e) = outcome {
        error!("Webhook processing failed: {}", e);
        return reject(500, "Webhook processing failed");
    }

    respond(
        200,
        &WebhookResponse {
            status: true,
            message: "Webhook processed".to_string(),
            event: webhook.trigger_event,
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

    fn sign(secret: &str, body: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac");
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = r#"{"triggerEvent":"BOOKING_CREATED","payload":{"id":42}}"#;
        let signature = sign("topsecret", body);
        assert!(verify_signature("topsecret", body.as_bytes(), &signature));
    }

    #[test]
    fn test_altered_body_rejected() {
        let body = r#"{"triggerEvent":"BOOKING_CREATED","payload":{"id":42}}"#;
        let signature = sign("topsecret", body);
        let altered = r#"{"triggerEvent":"BOOKING_CREATED","payload":{"id":43}}"#;
        assert!(!verify_signature("topsecret", altered.as_bytes(), &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = r#"{"x":1}"#;
        let signature = sign("topsecret", body);
        assert!(!verify_signature("othersecret", body.as_bytes(), &signature));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_signature("topsecret", b"{}", "not-a-hex-digest"));
    }

    #[test]
    fn test_booking_created_payload_parses() {
        let body = r#"{
            "triggerEvent": "BOOKING_CREATED",
            "payload": {
                "id": 1207,
                "attendees": [{"name": "Ana Lima", "email": "ana@example.com"}],
                "startTime": "2026-09-01T14:00:00Z",
                "endTime": "2026-09-01T14:30:00Z"
            }
        }"#;

        let webhook: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(webhook.trigger_event, "BOOKING_CREATED");
        assert_eq!(webhook.payload.id, 1207);
        let attendee = webhook.payload.attendees.first().unwrap();
        assert_eq!(attendee.name.as_deref(), Some("Ana Lima"));
        assert_eq!(attendee.email.as_deref(), Some("ana@example.com"));
        assert!(webhook.payload.start_time.is_some());
    }

    #[test]
    fn test_cancellation_payload_parses_without_attendees() {
        let body = r#"{
            "triggerEvent": "BOOKING_CANCELLED",
            "payload": {"id": 1207, "cancellationReason": "client request"}
        }"#;

        let webhook: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(webhook.trigger_event, "BOOKING_CANCELLED");
        assert!(webhook.payload.attendees.is_empty());
        assert_eq!(
            webhook.payload.cancellation_reason.as_deref(),
            Some("client request")
        );
    }
}
