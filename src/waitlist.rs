//! Waitlist signup.
//!
//! Membership is decided locally: once the email passes validation the
//! durable joined flag is set and the UI treats the user as signed up.
//! Remote delivery is a background courtesy with a bounded timeout; its
//! outcome never reaches the user.

use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitlistError {
    #[error("invalid email address")]
    InvalidEmail,
}

/// Minimal shape check: something before the `@`, a dot somewhere in the
/// domain, no whitespace. Deliverability is the remote side's problem.
pub fn validate_email(raw: &str) -> Result<&str, WaitlistError> {
    let email = raw.trim();
    let (local, domain) = email.split_once('@').ok_or(WaitlistError::InvalidEmail)?;
    let valid = !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.contains(char::is_whitespace)
        && !domain.contains('@');
    if valid {
        Ok(email)
    } else {
        Err(WaitlistError::InvalidEmail)
    }
}

/// Fire-and-forget remote delivery. With no URL configured signups stay
/// local-only.
#[derive(Clone)]
pub struct WaitlistClient {
    client: reqwest::Client,
    url: Option<Url>,
}

impl WaitlistClient {
    pub fn new(url: Option<Url>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(WaitlistClient { client, url })
    }

    /// Deliver one signup. Failures are logged and swallowed; the caller
    /// has already persisted membership locally.
    pub async fn submit(&self, email: &str, source: &str, points: u64) {
        let Some(url) = &self.url else {
            info!("Waitlist signup stored locally (no remote configured)");
            return;
        };
        let body = json!({
            "email": email,
            "source": source,
            "points": points,
        });
        match self.client.post(url.clone()).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Waitlist signup delivered for {}", email);
            }
            Ok(resp) => {
                warn!("Waitlist endpoint returned {} for {}", resp.status(), email);
            }
            Err(e) => {
                warn!("Waitlist delivery failed for {}: {}", email, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_addresses() {
        assert_eq!(validate_email("maria@example.ph"), Ok("maria@example.ph"));
        assert_eq!(
            validate_email("  juan.dela.cruz@mail.example.com "),
            Ok("juan.dela.cruz@mail.example.com")
        );
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for bad in [
            "",
            "   ",
            "plain",
            "@example.com",
            "maria@",
            "maria@nodot",
            "maria@.ph",
            "maria@example.ph.",
            "ma ria@example.ph",
            "maria@@example.ph",
        ] {
            assert_eq!(validate_email(bad), Err(WaitlistError::InvalidEmail), "{bad:?}");
        }
    }
}
