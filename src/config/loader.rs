//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DestinationTarget, QuarryConfig};
use super::secret::secret_string;
use crate::domain::errors::QuarryError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Substitutes `${VAR}` placeholders from the environment
/// 3. Parses the TOML into [`QuarryConfig`]
/// 4. Applies `QUARRY_<SECTION>_<KEY>` environment overrides
/// 5. Validates the result
///
/// # Errors
///
/// Returns [`QuarryError::Configuration`] if the file is missing or unreadable,
/// a referenced variable is unset, the TOML is malformed, an override has the
/// wrong type, or validation fails.
///
/// # Examples
///
/// ```no_run
/// use quarry::config::load_config;
///
/// let config = load_config("quarry.toml").expect("Failed to load config");
/// println!("Exporting project {}", config.source.project_id);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<QuarryConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(QuarryError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        QuarryError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    let mut config: QuarryConfig = toml::from_str(&contents)
        .map_err(|e| QuarryError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        QuarryError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format `${VAR_NAME}`
///
/// Comment lines are copied untouched. Every missing variable is reported at once.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| QuarryError::Other(format!("Invalid placeholder pattern: {}", e)))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let substituted = re.replace_all(line, |caps: &regex::Captures<'_>| {
            let var_name = &caps[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        lines.push(substituted.into_owned());
    }

    if !missing_vars.is_empty() {
        return Err(QuarryError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

/// Reads `name` from the environment and parses it, failing loudly on bad values
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val.trim().parse::<T>().map(Some).map_err(|e| {
            QuarryError::Configuration(format!("Invalid value '{}' for {}: {}", val, name, e))
        }),
        Err(_) => Ok(None),
    }
}

/// Applies environment variable overrides using the `QUARRY_` prefix
///
/// Variables follow `QUARRY_<SECTION>_<KEY>`, e.g. `QUARRY_SOURCE_PROJECT_ID`
/// or `QUARRY_EXPORT_MAX_WORKERS`.
fn apply_env_overrides(config: &mut QuarryConfig) -> Result<()> {
    // Application
    if let Ok(val) = std::env::var("QUARRY_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_parse("QUARRY_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // Source
    if let Ok(val) = std::env::var("QUARRY_SOURCE_BASE_URL") {
        config.source.base_url = val;
    }
    if let Ok(val) = std::env::var("QUARRY_SOURCE_EXPORT_URL") {
        config.source.export_url = val;
    }
    if let Ok(val) = std::env::var("QUARRY_SOURCE_PROJECT_ID") {
        config.source.project_id = val;
    }
    if let Ok(val) = std::env::var("QUARRY_SOURCE_USERNAME") {
        config.source.username = val;
    }
    if let Ok(val) = std::env::var("QUARRY_SOURCE_SECRET") {
        config.source.secret = secret_string(val);
    }
    if let Some(val) = env_parse("QUARRY_SOURCE_TIMEOUT_SECONDS")? {
        config.source.timeout_seconds = val;
    }
    if let Some(val) = env_parse("QUARRY_SOURCE_TLS_VERIFY")? {
        config.source.tls_verify = val;
    }

    // Export
    if let Some(val) = env_parse("QUARRY_EXPORT_CHUNK_DAYS")? {
        config.export.chunk_days = val;
    }
    if let Some(val) = env_parse("QUARRY_EXPORT_MAX_WORKERS")? {
        config.export.max_workers = val;
    }
    if let Some(val) = env_parse("QUARRY_EXPORT_QUEUE_CAPACITY")? {
        config.export.queue_capacity = Some(val);
    }
    if let Ok(val) = std::env::var("QUARRY_EXPORT_RECORD_FORMAT") {
        config.export.record_format = val;
    }
    if let Some(val) = env_parse("QUARRY_EXPORT_DRY_RUN")? {
        config.export.dry_run = val;
    }
    if let Ok(val) = std::env::var("QUARRY_EXPORT_FAILED_UNITS_PATH") {
        config.export.failed_units_path = Some(val);
    }

    // Destination
    if let Ok(val) = std::env::var("QUARRY_DESTINATION_TARGET") {
        config.destination_target = match val.to_lowercase().as_str() {
            "postgresql" => DestinationTarget::PostgreSQL,
            "jsonl" => DestinationTarget::Jsonl,
            other => {
                return Err(QuarryError::Configuration(format!(
                    "Invalid QUARRY_DESTINATION_TARGET '{}'. Must be postgresql or jsonl",
                    other
                )))
            }
        };
    }

    if let Some(ref mut pg) = config.postgresql {
        if let Ok(val) = std::env::var("QUARRY_POSTGRESQL_CONNECTION_STRING") {
            pg.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("QUARRY_POSTGRESQL_SCHEMA") {
            pg.schema = val;
        }
        if let Ok(val) = std::env::var("QUARRY_POSTGRESQL_SSL_MODE") {
            pg.ssl_mode = val;
        }
    }

    if let Some(ref mut jsonl) = config.jsonl {
        if let Ok(val) = std::env::var("QUARRY_JSONL_DIRECTORY") {
            jsonl.directory = val;
        }
    }

    // Logging
    if let Some(val) = env_parse("QUARRY_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("QUARRY_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
