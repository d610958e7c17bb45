use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_timeout_secs: u64,
    /// Seconds between scheduled analysis runs. Zero disables the scheduler.
    pub analysis_interval_secs: u64,
    pub api_key: Option<String>, // Optional, /api routes are open when unset
    pub run_migrations: bool,
    /// Language key for translatable CRM names (stages, industries).
    pub crm_language: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: env_number("PORT", 3000)?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("OPENAI_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            openai_model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
            openai_timeout_secs: env_number("OPENAI_TIMEOUT_SECS", 60)?,
            analysis_interval_secs: env_number("AI_ANALYSIS_INTERVAL_SECS", 86_400)?,
            api_key: std::env::var("API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            run_migrations: std::env::var("RUN_MIGRATIONS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            crm_language: std::env::var("CRM_LANG")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "en_US".to_string()),
        };

        if !config.openai_base_url.starts_with("http://")
            && !config.openai_base_url.starts_with("https://")
        {
            anyhow::bail!("OPENAI_BASE_URL must start with http:// or https://");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Database URL: {}...", url_prefix(&config.database_url));
        tracing::debug!("OpenAI Base URL: {}", config.openai_base_url);
        tracing::debug!("OpenAI Model: {}", config.openai_model);
        if config.api_key.is_none() {
            tracing::warn!("API_KEY not set, /api routes are unauthenticated");
        }
        if config.analysis_interval_secs == 0 {
            tracing::info!("Scheduled AI analysis disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Reads a numeric variable, falling back to `default` when unset.
fn env_number<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// First characters of a connection URL, enough to identify it in logs.
fn url_prefix(url: &str) -> String {
    url.chars().take(20).collect()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_prefix_respects_char_boundaries() {
        assert_eq!(url_prefix("postgres://u"), "postgres://u");
        let url = "postgres://łłłłłłłłłł:hasło@db/crm";
        assert!(!url.is_char_boundary(20));
        assert_eq!(url_prefix(url), "postgres://łłłłłłłłł");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_env_number_default_and_error() {
        assert_eq!(
            env_number::<u64>("RUST_CRM_AI_TEST_UNSET_NUMBER", 42).unwrap(),
            42
        );

        std::env::set_var("RUST_CRM_AI_TEST_BAD_NUMBER", "soon");
        let err = env_number::<u16>("RUST_CRM_AI_TEST_BAD_NUMBER", 1).unwrap_err();
        assert!(err.to_string().contains("RUST_CRM_AI_TEST_BAD_NUMBER"));
    }
}
