//! Unique Donation Identifier (UDI) generation.
//!
//! A UDI ties the physical donation token a volunteer hands out to the
//! ledger entry. It is a pure function of the branch code, the entered
//! sequence digits, the capture date and the active [`UdiPolicy`], so a
//! record that is retried always carries the same UDI and the ledger can
//! detect re-delivery.
//!
//! ## Formats
//!
//! | Policy             | Shape                           | Example       |
//! |--------------------|---------------------------------|---------------|
//! | `DateTeamWindowed` | `{branch}{MM}{DD}{YY}-{seq:02}` | `A030724-05`  |
//! | `BranchWindowed`   | `{branch}{seq:03}`              | `A005`        |

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::errors::{LoggerError, Result};

/// Inclusive window of sequence digits a volunteer may enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeqRange {
    pub min: u32,
    pub max: u32,
}

impl SeqRange {
    /// Build a range, rejecting empty windows and windows that include `0`.
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min == 0 || min > max {
            return Err(LoggerError::Config(format!(
                "invalid sequence range {min}-{max}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.min, self.max)
    }
}

/// Which UDI format is in force and which sequence window applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UdiPolicy {
    /// Date-stamped UDIs; each team owns a disjoint window of digits so two
    /// teams at the same branch never mint the same code on the same day.
    DateTeamWindowed { teams: BTreeMap<u8, SeqRange> },
    /// Branch-only UDIs over a single window, no date and no teams.
    BranchWindowed { range: SeqRange },
}

impl Default for UdiPolicy {
    fn default() -> Self {
        let teams = BTreeMap::from([
            (1, SeqRange { min: 1, max: 16 }),
            (2, SeqRange { min: 17, max: 32 }),
            (3, SeqRange { min: 33, max: 48 }),
        ]);
        Self::DateTeamWindowed { teams }
    }
}

impl UdiPolicy {
    /// `BranchWindowed` over the default `1–999` window.
    pub fn branch_default() -> Self {
        Self::BranchWindowed {
            range: SeqRange { min: 1, max: 999 },
        }
    }

    pub fn requires_team(&self) -> bool {
        matches!(self, Self::DateTeamWindowed { .. })
    }

    /// Short name used in configuration and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DateTeamWindowed { .. } => "date_team",
            Self::BranchWindowed { .. } => "branch",
        }
    }

    /// The sequence window that applies to `team`.
    ///
    /// Under `BranchWindowed` the team is ignored.
    pub fn range_for(&self, team: Option<u8>) -> Result<SeqRange> {
        match self {
            Self::BranchWindowed { range } => Ok(*range),
            Self::DateTeamWindowed { teams } => {
                let team = team.ok_or_else(|| {
                    LoggerError::Validation("Please select a team.".to_string())
                })?;
                teams
                    .get(&team)
                    .copied()
                    .ok_or_else(|| LoggerError::Validation(format!("Unknown team {team}.")))
            }
        }
    }

    /// Compute the UDI for a donation.
    ///
    /// `sequence` is the raw string from the form or the scanner.
    pub fn generate(
        &self,
        branch_code: &str,
        team: Option<u8>,
        sequence: &str,
        date: NaiveDate,
    ) -> Result<String> {
        let branch = branch_code.trim();
        if branch.is_empty() {
            return Err(LoggerError::Validation("Branch code is missing.".to_string()));
        }

        let range = self.range_for(team)?;
        let digits = parse_sequence(sequence)?;
        if !range.contains(digits) {
            return Err(LoggerError::Validation(format!(
                "UDI digits must be between {range}"
            )));
        }

        Ok(match self {
            Self::DateTeamWindowed { .. } => format!(
                "{branch}{:02}{:02}{:02}-{digits:02}",
                date.month(),
                date.day(),
                date.year().rem_euclid(100)
            ),
            Self::BranchWindowed { .. } => format!("{branch}{digits:03}"),
        })
    }
}

/// Parse the sequence digits typed or scanned by the volunteer.
pub fn parse_sequence(raw: &str) -> Result<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LoggerError::Validation(format!(
            "UDI digits must be a number, got {raw:?}"
        )));
    }
    trimmed
        .parse()
        .map_err(|_| LoggerError::Validation(format!("UDI digits out of range: {trimmed}")))
}
