use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use flowcore_client::{FlowcoreConfig, DEFAULT_BASE_URL, PRODUCTION_DATA_CORE};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Database
    pub database_url: String,
    pub reset_db: bool,

    // Event source
    pub flowcore_api_key: String,
    pub flowcore_tenant: String,
    pub flowcore_data_core: String,
    pub flowcore_base_url: String,
    pub dev_mode: bool,

    // Projection loop
    pub poll_interval_secs: u64,
    pub process_backlog_on_startup: bool,
    pub backlog_time_buckets: usize,
    pub page_size: u32,

    // Read API
    pub port: u16,
    pub backend_api_key: Option<String>,
    pub cors_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.log_keys();
        Ok(config)
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{key} must be set"));

        let config = Self {
            database_url: required("DATABASE_URL")?,
            reset_db: parse_or(get("RESET_DB"), "RESET_DB", false)?,
            flowcore_api_key: required("FLOWCORE_API_KEY")?,
            flowcore_tenant: get("FLOWCORE_TENANT").unwrap_or_else(|| "flowcore-saas".to_string()),
            flowcore_data_core: get("FLOWCORE_DATA_CORE")
                .unwrap_or_else(|| PRODUCTION_DATA_CORE.to_string()),
            flowcore_base_url: get("FLOWCORE_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            dev_mode: parse_or(get("DEV_MODE"), "DEV_MODE", false)?,
            poll_interval_secs: parse_or(get("POLL_INTERVAL"), "POLL_INTERVAL", 30)?,
            process_backlog_on_startup: parse_or(
                get("PROCESS_BACKLOG_ON_STARTUP"),
                "PROCESS_BACKLOG_ON_STARTUP",
                true,
            )?,
            backlog_time_buckets: parse_or(get("BACKLOG_TIME_BUCKETS"), "BACKLOG_TIME_BUCKETS", 3)?,
            page_size: parse_or(get("PAGE_SIZE"), "PAGE_SIZE", 500)?,
            port: parse_or(get("PORT"), "PORT", 18765)?,
            backend_api_key: get("BACKEND_API_KEY"),
            cors_origin: get("CORS_ORIGIN"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.dev_mode && self.flowcore_data_core == PRODUCTION_DATA_CORE {
            bail!(
                "DEV_MODE is enabled but FLOWCORE_DATA_CORE is \"{PRODUCTION_DATA_CORE}\" (production); \
                 point FLOWCORE_DATA_CORE at a development data core"
            );
        }
        if self.poll_interval_secs == 0 {
            bail!("POLL_INTERVAL must be at least 1 second");
        }
        if self.page_size == 0 {
            bail!("PAGE_SIZE must be at least 1");
        }
        Ok(())
    }

    pub fn flowcore(&self) -> FlowcoreConfig {
        FlowcoreConfig {
            base_url: self.flowcore_base_url.clone(),
            api_key: self.flowcore_api_key.clone(),
            tenant: self.flowcore_tenant.clone(),
            data_core: self.flowcore_data_core.clone(),
            dev_mode: self.dev_mode,
        }
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{}...({} chars)", head, val.chars().count())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) => preview(v),
                None => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  FLOWCORE_API_KEY: {}", preview(&self.flowcore_api_key));
        tracing::info!("  FLOWCORE_TENANT: {}", self.flowcore_tenant);
        tracing::info!("  FLOWCORE_DATA_CORE: {}", self.flowcore_data_core);
        tracing::info!("  DEV_MODE: {}", self.dev_mode);
        tracing::info!("  POLL_INTERVAL: {}s", self.poll_interval_secs);
        tracing::info!("  BACKEND_API_KEY: {}", preview_opt(&self.backend_api_key));
        if self.backend_api_key.is_none() {
            tracing::warn!("BACKEND_API_KEY not set, read API is unauthenticated");
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {v:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/calendrun"),
        ("FLOWCORE_API_KEY", "fc_secret_key"),
    ];

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(BASE).unwrap();
        assert_eq!(config.flowcore_tenant, "flowcore-saas");
        assert_eq!(config.flowcore_data_core, "calendrun");
        assert_eq!(config.flowcore_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.poll_interval_secs, 30);
        assert!(config.process_backlog_on_startup);
        assert_eq!(config.backlog_time_buckets, 3);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.port, 18765);
        assert!(!config.dev_mode);
        assert!(!config.reset_db);
        assert!(config.backend_api_key.is_none());
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let err = load(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert!(err.to_string().contains("FLOWCORE_API_KEY"));
    }

    #[test]
    fn invalid_number_is_an_error() {
        let mut vars = BASE.to_vec();
        vars.push(("POLL_INTERVAL", "soon"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL"));
    }

    #[test]
    fn dev_mode_refuses_production_data_core() {
        let mut vars = BASE.to_vec();
        vars.push(("DEV_MODE", "true"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("DEV_MODE"));

        vars.push(("FLOWCORE_DATA_CORE", "calendrun-dev"));
        let config = load(&vars).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.flowcore().data_core, "calendrun-dev");
    }

    #[test]
    fn blank_optional_values_count_as_unset() {
        let mut vars = BASE.to_vec();
        vars.push(("BACKEND_API_KEY", "  "));
        vars.push(("FLOWCORE_BASE_URL", "http://localhost:8080/"));
        let config = load(&vars).unwrap();
        assert!(config.backend_api_key.is_none());
        assert_eq!(config.flowcore_base_url, "http://localhost:8080");
    }
}
