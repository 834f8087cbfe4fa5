//! Remote ledger client — submits donations and looks up volunteer profiles.
//!
//! The ledger is a single HTTP endpoint. Requests are form-encoded; answers
//! are JSON objects carrying at least `success`. A rejection whose `error`
//! is exactly [`DUPLICATE_UDI`] means the ledger already holds that UDI,
//! which the sync engine treats as delivered.
//!
//! This client never retries. Anything that is not a clear answer is an
//! error, and the sync engine decides what to do with it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LoggerError, Result};
use crate::model::PendingDonation;

/// `error` value the ledger returns when the UDI is already recorded.
pub const DUPLICATE_UDI: &str = "UDI exists";

/// How the ledger answered a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    Accepted,
    /// Already recorded, e.g. by an earlier attempt whose reply was lost.
    Duplicate,
    Rejected(String),
}

/// Volunteer profile returned by the identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub first_name: String,
    pub branch_code: String,
    pub branch_name: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Deliver one queued donation.
    async fn submit(&self, donation: &PendingDonation) -> Result<LedgerOutcome>;

    /// Resolve a volunteer email to their branch profile.
    async fn lookup_profile(&self, email: &str) -> Result<Profile>;
}

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

/// Form body for a submission. `local_id` is deliberately absent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitForm<'a> {
    udi: &'a str,
    amount: f64,
    branch_letter: &'a str,
    fundraiser: &'a str,
    volunteer_email: &'a str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    volunteer_name: Option<&'a str>,
}

impl<'a> From<&'a PendingDonation> for SubmitForm<'a> {
    fn from(d: &'a PendingDonation) -> Self {
        Self {
            udi: &d.udi,
            amount: d.amount,
            branch_letter: &d.branch_code,
            fundraiser: &d.fundraiser,
            volunteer_email: &d.volunteer_email,
            timestamp: d.submitted_at_ms,
            volunteer_name: d.volunteer_name.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupForm<'a> {
    lookup_email: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LedgerResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl LedgerResponse {
    pub fn outcome(self) -> LedgerOutcome {
        match (self.success, self.error) {
            (true, _) => LedgerOutcome::Accepted,
            (false, Some(e)) if e == DUPLICATE_UDI => LedgerOutcome::Duplicate,
            (false, e) => LedgerOutcome::Rejected(e.unwrap_or_else(|| "unspecified".to_string())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    success: Option<bool>,
    error: Option<String>,
    first_name: Option<String>,
    branch_code: Option<String>,
    branch_name: Option<String>,
}

impl LookupResponse {
    fn into_profile(self) -> Result<Profile> {
        if self.success == Some(false) {
            return Err(LoggerError::Remote(
                self.error.unwrap_or_else(|| "profile lookup failed".to_string()),
            ));
        }
        match (self.first_name, self.branch_code, self.branch_name) {
            (Some(first_name), Some(branch_code), Some(branch_name))
                if !branch_code.trim().is_empty() =>
            {
                Ok(Profile {
                    first_name,
                    branch_code: branch_code.trim().to_string(),
                    branch_name,
                })
            }
            _ => Err(LoggerError::Remote(
                "profile lookup returned an incomplete profile".to_string(),
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────
// HTTP implementation
// ─────────────────────────────────────────────────────────

pub struct HttpLedger {
    client: Client,
    url: String,
}

impl HttpLedger {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post_form<F: Serialize + Sync, T: DeserializeOwned>(&self, form: &F) -> Result<T> {
        let resp = self.client.post(&self.url).form(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LoggerError::Remote(format!("ledger returned HTTP {status}")));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn submit(&self, donation: &PendingDonation) -> Result<LedgerOutcome> {
        let body: LedgerResponse = self.post_form(&SubmitForm::from(donation)).await?;
        debug!(udi = %donation.udi, success = body.success, error = ?body.error, "Ledger replied");
        Ok(body.outcome())
    }

    async fn lookup_profile(&self, email: &str) -> Result<Profile> {
        let body: LookupResponse = self
            .post_form(&LookupForm {
                lookup_email: email,
            })
            .await?;
        body.into_profile()
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────


/// In-process ledger for tests, answering per UDI and recording every call.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub enum Reply {
        Accept,
        Duplicate,
        Reject,
        Unreachable,
    }

    #[derive(Default)]
    pub struct FakeLedger {
        replies: Mutex<HashMap<String, Reply>>,
        submitted: Mutex<Vec<String>>,
        profile: Mutex<Option<Profile>>,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl FakeLedger {
        pub fn with_profile(branch_code: &str) -> Self {
            let ledger = Self::default();
            *ledger.profile.lock().unwrap() = Some(Profile {
                first_name: "Sam".to_string(),
                branch_code: branch_code.to_string(),
                branch_name: "Avondale".to_string(),
            });
            ledger
        }

        /// Answer `reply` for `udi` from now on. Unlisted UDIs are accepted.
        pub fn reply(&self, udi: &str, reply: Reply) {
            self.replies.lock().unwrap().insert(udi.to_string(), reply);
        }

        /// Stall the next `submit` after it has picked its reply, until the
        /// returned handle is notified.
        pub fn hold_next(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        /// Every UDI submitted so far, in call order.
        pub fn submitted(&self) -> Vec<String> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ledger for FakeLedger {
        async fn submit(&self, donation: &PendingDonation) -> Result<LedgerOutcome> {
            self.submitted.lock().unwrap().push(donation.udi.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(&donation.udi)
                .copied()
                .unwrap_or(Reply::Accept);
            let gate = self.gate.lock().unwrap().take();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            match reply {
                Reply::Accept => Ok(LedgerOutcome::Accepted),
                Reply::Duplicate => Ok(LedgerOutcome::Duplicate),
                Reply::Reject => Ok(LedgerOutcome::Rejected("sheet locked".to_string())),
                Reply::Unreachable => Err(LoggerError::Remote("connection reset".to_string())),
            }
        }

        async fn lookup_profile(&self, email: &str) -> Result<Profile> {
            self.profile
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| LoggerError::Remote(format!("no volunteer with email {email}")))
        }
    }
}
