//! Configuration management for Lambda functions.

use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase Postgres connection string
    pub database_url: String,
    /// HubSpot private app token (hubspot-sync only)
    pub hubspot_token: Option<String>,
    /// Shared secret for Cal.com webhook signatures (calcom-webhook only)
    pub calcom_webhook_secret: Option<String>,
    /// Resend API key for contact notifications (submit-contact only)
    pub resend_api_key: Option<String>,
    /// Address notified about new contact submissions
    pub contact_notify_email: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only the database URL is required at startup. Per-handler credentials
    /// stay optional here; each handler decides how their absence maps to a
    /// response (500 for the HubSpot token, 401 for the webhook secret).
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("SUPABASE_DB_URL")?,
            hubspot_token: env::var("HUBSPOT_PRIVATE_TOKEN").ok(),
            calcom_webhook_secret: env::var("CALCOM_WEBHOOK_SECRET").ok(),
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            contact_notify_email: env::var("CONTACT_NOTIFY_EMAIL").ok(),
        })
    }
}
