//! Application configuration loaded from environment variables.

use std::collections::BTreeMap;

use crate::errors::{LoggerError, Result};
use crate::udi::{SeqRange, UdiPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    /// Remote ledger endpoint (donation submit and profile lookup)
    pub ledger_url: String,
    /// Path to the SQLite database holding the pending queue
    pub database_url: String,
    /// Address the local API binds to
    pub bind_addr: String,
    /// Port for the local REST API
    pub api_port: u16,
    /// Per-request timeout for calls to the ledger
    pub request_timeout_secs: u64,
    /// Active UDI format and sequence windows
    pub udi_policy: UdiPolicy,
    /// Connectivity assumed at startup, before the UI reports anything
    pub start_online: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let udi_policy = parse_policy(
            &env_var("UDI_POLICY").unwrap_or_else(|_| "date_team".to_string()),
            &env_var("TEAM_RANGES").unwrap_or_else(|_| "1:1-16,2:17-32,3:33-48".to_string()),
            &env_var("BRANCH_RANGE").unwrap_or_else(|_| "1-999".to_string()),
        )?;

        Ok(Config {
            ledger_url: env_var("LEDGER_URL").map_err(|_| {
                LoggerError::Config("LEDGER_URL environment variable is required".to_string())
            })?,
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./afu_donations.db".to_string()),
            bind_addr: env_var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| LoggerError::Config("Invalid API_PORT".to_string()))?,
            request_timeout_secs: env_var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| LoggerError::Config("Invalid REQUEST_TIMEOUT_SECS".to_string()))?,
            udi_policy,
            start_online: env_var("START_ONLINE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| LoggerError::Config("Invalid START_ONLINE".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| LoggerError::Config(format!("Missing env var: {key}")))
}

/// Build the UDI policy from its textual settings.
///
/// `team_ranges` looks like `1:1-16,2:17-32`; `branch_range` like `1-999`.
/// Only the settings relevant to `kind` are parsed.
pub fn parse_policy(kind: &str, team_ranges: &str, branch_range: &str) -> Result<UdiPolicy> {
    match kind.trim() {
        "date_team" => {
            let mut teams = BTreeMap::new();
            for entry in team_ranges.split(',').filter(|e| !e.trim().is_empty()) {
                let (team, range) = entry.split_once(':').ok_or_else(|| {
                    LoggerError::Config(format!("Invalid TEAM_RANGES entry: {entry}"))
                })?;
                let team: u8 = team.trim().parse().map_err(|_| {
                    LoggerError::Config(format!("Invalid team number in TEAM_RANGES: {team}"))
                })?;
                if teams.insert(team, parse_range(range)?).is_some() {
                    return Err(LoggerError::Config(format!(
                        "Team {team} listed twice in TEAM_RANGES"
                    )));
                }
            }
            if teams.is_empty() {
                return Err(LoggerError::Config("TEAM_RANGES is empty".to_string()));
            }
            Ok(UdiPolicy::DateTeamWindowed { teams })
        }
        "branch" => Ok(UdiPolicy::BranchWindowed {
            range: parse_range(branch_range)?,
        }),
        other => Err(LoggerError::Config(format!(
            "Invalid UDI_POLICY {other:?} (expected date_team or branch)"
        ))),
    }
}

fn parse_range(raw: &str) -> Result<SeqRange> {
    let (min, max) = raw
        .trim()
        .split_once('-')
        .ok_or_else(|| LoggerError::Config(format!("Invalid range: {raw}")))?;
    let min = min
        .trim()
        .parse()
        .map_err(|_| LoggerError::Config(format!("Invalid range start: {raw}")))?;
    let max = max
        .trim()
        .parse()
        .map_err(|_| LoggerError::Config(format!("Invalid range end: {raw}")))?;
    SeqRange::new(min, max)
}
