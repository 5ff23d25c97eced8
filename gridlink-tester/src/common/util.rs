use anyhow::{Context, Result};
use gridlink_game::EngineConfig;
use std::path::Path;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Engine configuration from an optional JSON file; defaults when absent.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid configuration.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_csv_trims_and_filters() {
        let parts = split_csv(" alpha, ,beta,  gamma ");
        assert_eq!(parts, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn load_config_defaults_without_a_path() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn load_config_reads_partial_files() {
        let path = std::env::temp_dir().join(format!(
            "gridlink-config-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::write(&path, r#"{ "page_size": 8, "max_lives": 3 }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.page_size, 8);
        assert_eq!(config.max_lives, 3);
        assert_eq!(config.preload_forward, 3);
    }

    #[test]
    fn load_config_reports_missing_files() {
        let err = load_config(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config"));
    }
}
