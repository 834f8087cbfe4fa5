//! Submission flow: session context plus the per-donation pipeline.
//!
//! A donation is validated, given its UDI, written to the local queue and
//! only then offered to the ledger. Once the queue write succeeds the
//! volunteer gets the UDI back; the sync pass runs in the background, so a
//! slow or stalled ledger never holds up the receipt.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::errors::{LoggerError, Result};
use crate::model::{DonationForm, NewDonation};
use crate::store;
use crate::sync::SyncEngine;
use crate::udi::{SeqRange, UdiPolicy};

/// Who is logging donations on this device, and for which branch and team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionContext {
    pub volunteer_email: String,
    pub first_name: String,
    pub branch_code: String,
    pub branch_name: String,
    pub team: Option<u8>,
}

/// Returned to the volunteer once a donation is safely queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub udi: String,
    pub local_id: i64,
    /// Donations queued on this device when the receipt was issued, this
    /// one included.
    pub pending: i64,
}

pub struct Submitter {
    engine: Arc<SyncEngine>,
    policy: UdiPolicy,
    session: RwLock<Option<SessionContext>>,
}

impl Submitter {
    pub fn new(engine: Arc<SyncEngine>, policy: UdiPolicy) -> Self {
        Self {
            engine,
            policy,
            session: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn policy(&self) -> &UdiPolicy {
        &self.policy
    }

    pub async fn session(&self) -> Option<SessionContext> {
        self.session.read().await.clone()
    }

    /// Establish the session from an identity-provider credential.
    ///
    /// The token is only read for its `email` claim; it is not verified.
    pub async fn sign_in(&self, credential: &str, team: Option<u8>) -> Result<SessionContext> {
        let email = email_from_credential(credential)?;
        if let Some(team) = team {
            self.check_team(team)?;
        }

        let profile = self.engine.ledger().lookup_profile(&email).await?;

        let session = SessionContext {
            volunteer_email: email,
            first_name: profile.first_name,
            branch_code: profile.branch_code,
            branch_name: profile.branch_name,
            team,
        };
        info!(
            email = %session.volunteer_email,
            branch = %session.branch_code,
            "Volunteer signed in"
        );
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Switch the signed-in volunteer to another team.
    pub async fn select_team(&self, team: u8) -> Result<SessionContext> {
        self.check_team(team)?;
        let mut guard = self.session.write().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| LoggerError::NotAuthenticated("Please sign in first.".to_string()))?;
        session.team = Some(team);
        Ok(session.clone())
    }

    /// Forget the volunteer. Queued donations are kept and still synced.
    pub async fn sign_out(&self) {
        if let Some(session) = self.session.write().await.take() {
            info!(email = %session.volunteer_email, "Volunteer signed out");
        }
    }

    /// Sequence window the current volunteer may enter.
    pub async fn allowed_range(&self) -> Result<SeqRange> {
        let team = self
            .session()
            .await
            .ok_or_else(|| LoggerError::NotAuthenticated("Please sign in first.".to_string()))?
            .team;
        self.policy.range_for(team)
    }

    pub async fn submit(&self, form: &DonationForm) -> Result<SubmitReceipt> {
        self.submit_at(form, Local::now()).await
    }

    /// Submit as if captured at `now`; the date feeds the UDI.
    pub async fn submit_at(&self, form: &DonationForm, now: DateTime<Local>) -> Result<SubmitReceipt> {
        let session = self
            .session()
            .await
            .ok_or_else(|| LoggerError::NotAuthenticated("Please sign in first.".to_string()))?;

        let udi = self.policy.generate(
            &session.branch_code,
            session.team,
            &form.udi_digits,
            now.date_naive(),
        )?;
        let amount = parse_amount(&form.amount)?;
        let fundraiser = form.fundraiser.trim();
        if fundraiser.is_empty() {
            return Err(LoggerError::Validation("Please select a fundraiser.".to_string()));
        }

        let donation = NewDonation {
            udi,
            amount,
            branch_code: session.branch_code,
            team: session.team,
            fundraiser: fundraiser.to_string(),
            volunteer_email: session.volunteer_email,
            volunteer_name: Some(session.first_name).filter(|n| !n.is_empty()),
            submitted_at_ms: now.timestamp_millis(),
        };

        let pool = self.engine.pool();
        let local_id = store::append(pool, &donation).await?;
        let pending = store::count(pool).await.unwrap_or_else(|e| {
            warn!(local_id, "Could not count queue after save: {e}");
            1
        });
        info!(local_id, pending, udi = %donation.udi, "Donation saved");

        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            engine.sync_pass().await;
        });

        Ok(SubmitReceipt {
            udi: donation.udi,
            local_id,
            pending,
        })
    }

    fn check_team(&self, team: u8) -> Result<()> {
        if self.policy.requires_team() {
            self.policy.range_for(Some(team))?;
        }
        Ok(())
    }
}

/// Pull the `email` claim out of a JWT-shaped credential.
pub fn email_from_credential(credential: &str) -> Result<String> {
    let unreadable =
        || LoggerError::NotAuthenticated("Could not read your account. Please try again.".to_string());

    let payload = credential.split('.').nth(1).ok_or_else(unreadable)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| unreadable())?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| unreadable())?;

    claims
        .get("email")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(String::from)
        .ok_or_else(unreadable)
}

fn parse_amount(raw: &str) -> Result<f64> {
    match raw.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(LoggerError::Validation(
            "Enter a valid donation amount.".to_string(),
        )),
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
