//! Runtime configuration
//!
//! Everything environment-specific (data source location, generation endpoint,
//! timeouts) is read here once and handed to the components as plain values.

use crate::error::{AgentError, Result};
use std::time::Duration;

pub const DEFAULT_DB_NAME: &str = "pqFirstVerifyProduction";
pub const DEFAULT_LLM_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_LABEL_BUDGET: usize = 50;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub db_timeout: Duration,
    /// Maximum characters kept from a discovered knowledge-base label.
    pub label_budget: usize,
    pub bind_addr: String,
}

impl AppConfig {
    /// Load from the process environment, honouring a `.env` file if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => connection_string_from_parts(&lookup)?,
        };

        let llm_url = match lookup("LLM_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => {
                let ip = lookup("AWS_LLM_IP")
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        AgentError::Config("neither LLM_URL nor AWS_LLM_IP is set".to_string())
                    })?;
                format!("http://{}:11434/api/chat", ip.trim())
            }
        };

        let llm_model = lookup("LLM_MODEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());

        let llm_timeout_secs = parse_number(&lookup, "LLM_TIMEOUT_SECS", 90)?.clamp(30, 90);
        let db_timeout_secs = parse_number(&lookup, "DB_TIMEOUT_SECS", 30)?.clamp(1, 30);
        let label_budget = parse_number(&lookup, "KB_LABEL_BUDGET", DEFAULT_LABEL_BUDGET as u64)?;
        if label_budget == 0 {
            return Err(AgentError::Config("KB_LABEL_BUDGET must be positive".to_string()));
        }

        let bind_addr = lookup("BIND_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Ok(Self {
            database_url,
            llm_url,
            llm_model,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            db_timeout: Duration::from_secs(db_timeout_secs),
            label_budget: label_budget as usize,
            bind_addr,
        })
    }
}

/// ADO.NET connection string from `DB_SERVER` / `DB_NAME` / `DB_USER` / `DB_PASSWORD`.
/// Without a user, Windows integrated security is requested.
fn connection_string_from_parts<F>(lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let server = non_empty("DB_SERVER").ok_or_else(|| {
        AgentError::Config("neither DATABASE_URL nor DB_SERVER is set".to_string())
    })?;
    let database = non_empty("DB_NAME").unwrap_or_else(|| DEFAULT_DB_NAME.to_string());

    let auth = match non_empty("DB_USER") {
        Some(user) => format!(
            "user={};password={}",
            user.trim(),
            non_empty("DB_PASSWORD").unwrap_or_default()
        ),
        None => "IntegratedSecurity=true".to_string(),
    };

    Ok(format!(
        "server={};database={};{};TrustServerCertificate=true",
        server.trim(),
        database.trim(),
        auth
    ))
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| AgentError::Config(format!("{} must be a number: {}", key, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_and_derived_llm_url() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "server=tcp:localhost,1433;database=pq;user=sa;password=x"),
            ("AWS_LLM_IP", "10.0.0.5"),
        ]))
        .unwrap();

        assert_eq!(cfg.llm_url, "http://10.0.0.5:11434/api/chat");
        assert_eq!(cfg.llm_model, DEFAULT_LLM_MODEL);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(90));
        assert_eq!(cfg.db_timeout, Duration::from_secs(30));
        assert_eq!(cfg.label_budget, 50);
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
    }

    #[test]
    fn test_timeouts_are_clamped() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "server=tcp:localhost,1433;database=pq;user=sa;password=x"),
            ("LLM_URL", "http://llm/api/chat"),
            ("LLM_TIMEOUT_SECS", "5"),
            ("DB_TIMEOUT_SECS", "600"),
        ]))
        .unwrap();

        assert_eq!(cfg.llm_timeout, Duration::from_secs(30));
        assert_eq!(cfg.db_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_connection_string_from_parts() {
        let cfg = AppConfig::from_lookup(lookup_from(&[
            ("DB_SERVER", "tcp:sql01,1433"),
            ("DB_USER", "svc_prequal"),
            ("DB_PASSWORD", "pw"),
            ("LLM_URL", "http://llm/api/chat"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.database_url,
            "server=tcp:sql01,1433;database=pqFirstVerifyProduction;user=svc_prequal;password=pw;TrustServerCertificate=true"
        );

        let integrated = AppConfig::from_lookup(lookup_from(&[
            ("DB_SERVER", "localhost\\SQLEXPRESS"),
            ("DB_NAME", "FirstVerify"),
            ("LLM_URL", "http://llm/api/chat"),
        ]))
        .unwrap();
        assert!(integrated.database_url.contains("database=FirstVerify;IntegratedSecurity=true"));
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        let err = AppConfig::from_lookup(lookup_from(&[("LLM_URL", "http://llm")])).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "server=tcp:localhost,1433;database=pq;user=sa;password=x"),
            ("LLM_URL", "http://llm"),
            ("KB_LABEL_BUDGET", "forty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("KB_LABEL_BUDGET"));
    }
}
