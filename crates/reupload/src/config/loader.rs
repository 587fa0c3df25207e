use std::path::Path;

use crate::config::schema::RunConfig;
use crate::error::ConfigError;

const SUPPORTED_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<RunConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<RunConfig, ConfigError> {
    let config: RunConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.workitem_workers == 0 || config.file_workers == 0 {
        return Err(ConfigError::Validation {
            message: "workitem_workers and file_workers must be greater than 0".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "retry.max_attempts must be at least 1".to_string(),
        });
    }

    // Fails fast on bad bounds before any state is touched.
    config.partition()?;

    if !config.resume && config.csv.is_none() {
        return Err(ConfigError::Validation {
            message: "csv is required unless resume is set".to_string(),
        });
    }

    if config.remaining_csv.is_some() && config.csv.is_none() {
        return Err(ConfigError::Validation {
            message: "remaining_csv needs csv to filter".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionError;
    use std::path::PathBuf;

    const MINIMAL: &str = r#"
    {
        "version": "1.0",
        "csv": "failed_workitems.csv",
        "manifest": "manifest.json",
        "source_root": "/data/source",
        "target_root": "/data/target"
    }
    "#;

    fn with(extra: &str) -> String {
        MINIMAL.replacen("\"version\": \"1.0\",", &format!("\"version\": \"1.0\", {extra},"), 1)
    }

    #[test]
    fn test_load_minimal_config_applies_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.csv, Some(PathBuf::from("failed_workitems.csv")));
        assert_eq!(config.state_db, PathBuf::from("reupload_state.db"));
        assert_eq!(config.workitem_workers, 20);
        assert_eq!(config.file_workers, 10);
        assert!(!config.resume);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 200);
        assert_eq!(config.target_container, "results");
        assert_eq!(config.partition().unwrap(), None);
        assert_eq!(config.db_pool_size(), 64);
    }

    #[test]
    fn test_partition_settings() {
        let config = load_config_from_str(&with(r#""partition": 1, "total_partitions": 4"#)).unwrap();
        assert_eq!(config.partition().unwrap().unwrap().to_string(), "2/4");

        let err = load_config_from_str(&with(r#""partition": 4, "total_partitions": 4"#)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Partition(PartitionError::IndexOutOfRange { index: 4, total: 4 })
        ));

        let err = load_config_from_str(&with(r#""partition": 0"#)).unwrap_err();
        assert!(matches!(err, ConfigError::Partition(PartitionError::Incomplete)));

        let err = load_config_from_str(&with(r#""partition": 0, "total_partitions": 1"#)).unwrap_err();
        assert!(matches!(err, ConfigError::Partition(PartitionError::TooFewPartitions(1))));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = load_config_from_str(&with(r#""file_workers": 0"#)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_csv_required_unless_resume() {
        let no_csv = r#"
        {
            "version": "1.0",
            "manifest": "m.json",
            "source_root": "s",
            "target_root": "t"
        }
        "#;
        assert!(matches!(
            load_config_from_str(no_csv),
            Err(ConfigError::Validation { .. })
        ));

        let resume = no_csv.replacen("\"version\": \"1.0\",", "\"version\": \"1.0\", \"resume\": true,", 1);
        let config = load_config_from_str(&resume).unwrap();
        assert!(config.resume);
    }

    #[test]
    fn test_unsupported_version() {
        let err = load_config_from_str(&MINIMAL.replace("1.0", "2.0")).unwrap_err();
        assert!(err.to_string().contains("Unsupported config version: 2.0"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(load_config_from_str("{"), Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let config = load_config_from_str(&with(
            r#""retry": {"max_attempts": 5, "initial_backoff_ms": 50}"#,
        ))
        .unwrap();
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, std::time::Duration::from_millis(50));
        assert_eq!(policy.max_backoff, std::time::Duration::from_secs(10));
    }
}
