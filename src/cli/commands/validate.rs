//! Validate config command implementation

use crate::cli::{exit_code_for, EXIT_SUCCESS};
use crate::config::load_config;
use crate::config::schema::DestinationTarget;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Load and validate the configuration, then print a summary
    ///
    /// [`load_config`] validates, so any failure here is reported with exit code 2.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");
        println!("🔍 Validating configuration file: {config_path}");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(exit_code_for(&e));
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);
        println!("  Query API: {}", config.source.base_url);
        println!("  Export API: {}", config.source.export_url);
        println!("  Project: {}", config.source.project_id);

        match config.destination_target {
            DestinationTarget::PostgreSQL => {
                if let Some(ref pg) = config.postgresql {
                    println!("  Destination: PostgreSQL (schema '{}')", pg.schema);
                    println!("  SSL Mode: {}", pg.ssl_mode);
                }
            }
            DestinationTarget::Jsonl => {
                if let Some(ref jsonl) = config.jsonl {
                    println!("  Destination: JSON lines in {}", jsonl.directory);
                }
            }
        }

        println!("  Chunk Days: {}", config.export.chunk_days);
        println!("  Max Workers: {}", config.export.max_workers);
        println!(
            "  Queue Capacity: {}",
            config
                .export
                .queue_capacity
                .map_or_else(|| "2 x workers".to_string(), |c| c.to_string())
        );
        println!("  Record Format: {}", config.export.record_format);
        println!("  Dry Run: {}", config.export.dry_run || config.application.dry_run);
        println!();
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::EXIT_CONFIG;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_missing_config_is_config_error() {
        let code = ValidateArgs {}
            .execute("/nonexistent/quarry.toml")
            .await
            .unwrap();
        assert_eq!(code, EXIT_CONFIG);
    }

    #[tokio::test]
    async fn test_valid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
destination_target = "jsonl"

[source]
project_id = "42"
username = "svc"
secret = "s3cret"

[jsonl]
directory = "{}"
"#,
            dir.path().display()
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, EXIT_SUCCESS);
    }
}
