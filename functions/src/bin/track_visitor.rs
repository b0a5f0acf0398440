//! Visitor Analytics Lambda - Privacy-safe page view tracking.
//!
//! Stores one row per event in `analytics_events` with coarse visitor
//! metadata only: device class and browser family sniffed from the
//! user-agent, and the country from the platform's geo headers. No IPs,
//! no fingerprints.
//!
//! Analytics is best-effort by contract: a failed insert still answers 200
//! with `tracked:false` so the site never surfaces a tracking error.

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use shared::{error_response, header, json_response, preflight_response, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Tracking payload from the site snippet.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRequest {
    page: Option<String>,
    referrer: Option<String>,
    user_agent: Option<String>,
    session_id: Option<String>,
    #[serde(rename = "event")]
    event_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct TrackResponse {
    status: bool,
    tracked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Coarse visitor metadata derived per request.
#[derive(Debug, PartialEq)]
struct Visitor {
    device_type: &'static str,
    browser: &'static str,
    country: String,
}

/// Application state
struct AppState {
    db_pool: PgPool,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env().map_err(|_| "SUPABASE_DB_URL not set")?;
        let db_pool = shared::create_pool(&config).await?;

        Ok(Self { db_pool })
    }
}

/// Classify device and browser from a user-agent string.
///
/// Ordered substring checks, first match wins. The ordering is load-bearing:
/// Edge and Opera user-agents also contain "chrome", and almost everything
/// contains "safari".
fn parse_user_agent(user_agent: &str) -> (&'static str, &'static str) {
    let ua = user_agent.to_lowercase();

    let device_type = if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "mobile"
    } else if ua.contains("tablet") || ua.contains("ipad") {
        "tablet"
    } else {
        "desktop"
    };

    let browser = if ua.contains("firefox") {
        "Firefox"
    } else if ua.contains("chrome") && !ua.contains("edge") {
        "Chrome"
    } else if ua.contains("safari") && !ua.contains("chrome") {
        "Safari"
    } else if ua.contains("edge") {
        "Edge"
    } else if ua.contains("opera") || ua.contains("opr") {
        "Opera"
    } else {
        "Other"
    };

    (device_type, browser)
}

/// Resolve the visitor's country from platform geo headers.
///
/// Prefers the newer `x-nf-geo` JSON header over the plain `x-country` one.
fn resolve_country(x_country: Option<&str>, x_nf_geo: Option<&str>) -> String {
    let mut country = "unknown".to_string();

    if let Some(code) = x_country {
        if !code.is_empty() {
            country = code.to_string();
        }
    }

    if let Some(geo) = x_nf_geo {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(geo) {
            if let Some(code) = parsed["country"]["code"].as_str() {
                country = code.to_string();
            }
        }
    }

    country
}

fn extract_visitor(event: &Request, body_user_agent: Option<&str>) -> Visitor {
    let user_agent = match body_user_agent {
        Some(ua) if !ua.is_empty() => ua,
        _ => header(event, "user-agent").unwrap_or(""),
    };
    let (device_type, browser) = parse_user_agent(user_agent);

    Visitor {
        device_type,
        browser,
        country: resolve_country(header(event, "x-country"), header(event, "x-nf-geo")),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    match event.method().as_str() {
        "OPTIONS" => return preflight_response(),
        "POST" => {}
        _ => return error_response(405, "Use POST"),
    }

    let request: TrackRequest = match serde_json::from_slice(event.body().as_ref()) {
        Ok(parsed) => parsed,
        Err(e) => return error_response(400, format!("Invalid request body: {}", e)),
    };

    let Some(page) = request.page.filter(|p| !p.is_empty()) else {
        return error_response(400, "page required");
    };

    let visitor = extract_visitor(&event, request.user_agent.as_deref());
    let event_type = request.event_type.unwrap_or_else(|| "pageview".to_string());

    let insert = sqlx::query(
        r#"
        INSERT INTO analytics_events
            (event_type, page_path, referrer, session_id, country, browser, device_type, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&event_type)
    .bind(&page)
    .bind(&request.referrer)
    .bind(&request.session_id)
    .bind(&visitor.country)
    .bind(visitor.browser)
    .bind(visitor.device_type)
    .bind(Utc::now())
    .execute(&state.db_pool)
    .await;

    // Losing an analytics event must never surface as a user-facing error.
    if let Err(e) = insert {
        warn!("Analytics insert failed: {}", e);
        return json_response(
            200,
            &TrackResponse {
                status: true,
                tracked: false,
                message: Some("analytics unavailable".to_string()),
            },
        );
    }

    info!("Visitor tracked: {} {}", page, visitor.country);

    json_response(
        200,
        &TrackResponse {
            status: true,
            tracked: true,
            message: None,
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
