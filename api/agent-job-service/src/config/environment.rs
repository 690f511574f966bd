use crate::module::agent_job::schema::Amount;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rust_env: String,
    pub api_host: String,
    pub api_port: u16,
    pub redis_url: Option<String>,
    pub agent_identifier: String,
    pub seller_vkey: String,
    pub price_amounts: Vec<Amount>,
    pub payment_required: bool,
    pub submit_result_window_seconds: i64,
    pub unlock_delay_seconds: i64,
    pub dispute_window_seconds: i64,
    pub payment_min_confirmations: u32,
    pub input_schema: String,
    pub input_schema_path: Option<String>,
    pub allow_extra_input_keys: bool,
    pub execution_backend: String,
    pub execution_base_url: Option<String>,
    pub local_worker_concurrency: i64,
    pub sweep_enabled: bool,
    pub sweep_interval_seconds: i64,
    pub cas_max_attempts: i64,
    /// How long a paid job may sit without an execution handle before the sweep resubmits it.
    pub resubmit_after_seconds: i64,
    pub internal_auth_enabled: bool,
    pub internal_auth_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        load_dotenv_layers();
        Ok(Self {
            rust_env: read_var("RUST_ENV")?,
            api_host: read_var("API_HOST")?,
            api_port: read_var("API_PORT")?
                .parse::<u16>()
                .map_err(|e| format!("invalid API_PORT: {e}"))?,
            redis_url: env::var("REDIS_URL").ok(),
            agent_identifier: read_var("AGENT_IDENTIFIER")?,
            seller_vkey: read_var("SELLER_VKEY")?,
            price_amounts: parse_price_amounts(&read_optional_string(
                "PRICE_AMOUNTS",
                "10000000:lovelace",
            ))
            .map_err(|e| format!("invalid PRICE_AMOUNTS: {e}"))?,
            payment_required: read_optional_bool("PAYMENT_REQUIRED", true),
            submit_result_window_seconds: read_optional_i64("SUBMIT_RESULT_WINDOW_SECONDS", 3600)?,
            unlock_delay_seconds: read_optional_i64("UNLOCK_DELAY_SECONDS", 7200)?,
            dispute_window_seconds: read_optional_i64("DISPUTE_WINDOW_SECONDS", 3600)?,
            payment_min_confirmations: u32::try_from(read_optional_u64(
                "PAYMENT_MIN_CONFIRMATIONS",
                1,
            )?)
            .map_err(|e| format!("invalid PAYMENT_MIN_CONFIRMATIONS: {e}"))?,
            input_schema: read_optional_string("INPUT_SCHEMA", "text:string"),
            input_schema_path: env::var("INPUT_SCHEMA_PATH").ok(),
            allow_extra_input_keys: read_optional_bool("ALLOW_EXTRA_INPUT_KEYS", false),
            execution_backend: read_optional_string("EXECUTION_BACKEND", "local"),
            execution_base_url: env::var("EXECUTION_BASE_URL").ok(),
            local_worker_concurrency: read_optional_i64("LOCAL_WORKER_CONCURRENCY", 4)?,
            sweep_enabled: read_optional_bool("SWEEP_ENABLED", true),
            sweep_interval_seconds: read_optional_i64("SWEEP_INTERVAL_SECONDS", 5)?,
            cas_max_attempts: read_optional_i64("CAS_MAX_ATTEMPTS", 8)?,
            resubmit_after_seconds: read_optional_i64("RESUBMIT_AFTER_SECONDS", 30)?,
            internal_auth_enabled: read_optional_bool("INTERNAL_AUTH_ENABLED", false),
            internal_auth_secret: env::var("INTERNAL_AUTH_SECRET").ok(),
        })
    }
}

/// Parses `amount:unit` pairs separated by commas, e.g. `10000000:lovelace,5000000:usdm`.
pub fn parse_price_amounts(raw: &str) -> Result<Vec<Amount>, String> {
    let mut amounts = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (amount, unit) = entry
            .split_once(':')
            .ok_or_else(|| format!("expected amount:unit, got {entry:?}"))?;
        let amount = amount
            .trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid amount in {entry:?}: {e}"))?;
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(format!("missing unit in {entry:?}"));
        }
        amounts.push(Amount {
            amount,
            unit: unit.to_string(),
        });
    }
    if amounts.is_empty() {
        return Err("at least one amount is required".to_string());
    }
    Ok(amounts)
}

fn read_var(key: &str) -> Result<String, String> {
    env::var(key).map_err(|_| format!("missing required env var: {key}"))
}

fn read_optional_i64(key: &str, default: i64) -> Result<i64, String> {
    match env::var(key) {
        Ok(v) => v.parse::<i64>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_u64(key: &str, default: u64) -> Result<u64, String> {
    match env::var(key) {
        Ok(v) => v.parse::<u64>().map_err(|e| format!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

fn read_optional_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => default,
    }
}

fn read_optional_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn load_dotenv_layers() {
    for path in [".env", "../.env", "../../.env"] {
        let _ = dotenvy::from_path_override(path);
    }
}
