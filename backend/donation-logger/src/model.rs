//! Donation records as they move from the form to the queue and out to the ledger.

use serde::{Deserialize, Deserializer, Serialize};

/// A donation built by the submission flow, not yet persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDonation {
    pub udi: String,
    pub amount: f64,
    pub branch_code: String,
    pub team: Option<u8>,
    pub fundraiser: String,
    pub volunteer_email: String,
    pub volunteer_name: Option<String>,
    pub submitted_at_ms: i64,
}

/// A queued donation as stored in / read from the database.
///
/// `local_id` identifies the row on this device only and is stripped
/// before anything is sent to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingDonation {
    pub local_id: i64,
    pub udi: String,
    pub amount: f64,
    pub branch_code: String,
    pub team: Option<u8>,
    pub fundraiser: String,
    pub volunteer_email: String,
    pub volunteer_name: Option<String>,
    pub submitted_at_ms: i64,
}

/// Raw form fields posted by the UI.
///
/// Everything arrives as text, the way the browser form holds it; parsing
/// and range checks happen in the submission flow.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DonationForm {
    /// Sequence digits, typed or produced by the barcode scanner.
    #[serde(deserialize_with = "text_or_number")]
    pub udi_digits: String,
    #[serde(deserialize_with = "text_or_number")]
    pub amount: String,
    pub fundraiser: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Text(s) => s,
        TextOrNumber::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_accepts_numbers_and_text() {
        let form: DonationForm = serde_json::from_value(serde_json::json!({
            "udi_digits": 5,
            "amount": "20.50",
            "fundraiser": "Candle"
        }))
        .unwrap();
        assert_eq!(form.udi_digits, "5");
        assert_eq!(form.amount, "20.50");
        assert_eq!(form.fundraiser, "Candle");
    }

    #[test]
    fn form_missing_fields_default_to_empty() {
        let form: DonationForm = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(form.udi_digits.is_empty());
        assert!(form.fundraiser.is_empty());
    }
}
