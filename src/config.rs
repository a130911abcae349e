use crate::cache::FetchOptions;
use crate::domain::{Address, Decimal, Network};
use crate::engine::CostBasisMethod;
use crate::orchestration::DEFAULT_MAX_HISTORY_ROUNDS;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub leg_source_url: String,
    pub cost_basis_method: CostBasisMethod,
    pub raw_page_limit: u32,
    pub min_usd: Option<Decimal>,
    pub spam_filter: bool,
    pub max_history_rounds: usize,
    pub default_networks: Vec<Network>,
    pub default_wallets: Vec<Address>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let leg_source_url = env_map
            .get("LEG_SOURCE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv("LEG_SOURCE_URL".to_string()))?;

        let cost_basis_method = env_map
            .get("COST_BASIS_METHOD")
            .map(|s| s.as_str())
            .unwrap_or("fifo")
            .parse::<CostBasisMethod>()
            .map_err(|e| {
                ConfigError::InvalidValue(
                    "COST_BASIS_METHOD".to_string(),
                    format!("must be fifo, lifo, or specific_id ({})", e),
                )
            })?;

        let raw_page_limit = env_map
            .get("RAW_PAGE_LIMIT")
            .map(|s| s.as_str())
            .unwrap_or("100")
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "RAW_PAGE_LIMIT".to_string(),
                    "must be a positive u32".to_string(),
                )
            })?;

        let min_usd = match env_map.get("MIN_USD").map(|s| s.trim()) {
            None | Some("") => None,
            Some(raw) => Some(Decimal::from_str_canonical(raw).map_err(|_| {
                ConfigError::InvalidValue("MIN_USD".to_string(), "must be a decimal".to_string())
            })?),
        };

        let spam_filter = match env_map
            .get("SPAM_FILTER")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
            .unwrap_or("true")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SPAM_FILTER".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let max_history_rounds = match env_map.get("MAX_HISTORY_ROUNDS") {
            None => DEFAULT_MAX_HISTORY_ROUNDS,
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "MAX_HISTORY_ROUNDS".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })?,
        };

        let default_networks = env_map
            .get("DEFAULT_NETWORKS")
            .map(|s| split_list(s).into_iter().map(Network::new).collect())
            .unwrap_or_default();

        let default_wallets = parse_wallets_from_map(&env_map)?;

        Ok(Config {
            port,
            leg_source_url,
            cost_basis_method,
            raw_page_limit,
            min_usd,
            spam_filter,
            max_history_rounds,
            default_networks,
            default_wallets,
        })
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            limit: self.raw_page_limit,
            min_usd: self.min_usd,
            spam_filter: self.spam_filter,
            class: None,
        }
    }
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_wallets_from_map(env_map: &HashMap<String, String>) -> Result<Vec<Address>, ConfigError> {
    if let Some(wallets) = env_map.get("WALLETS") {
        Ok(split_list(wallets).into_iter().map(Address::new).collect())
    } else if let Some(file_path) = env_map.get("WALLETS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "WALLETS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Address::new)
            .collect())
    } else {
        Ok(Vec::new())
    }
}
