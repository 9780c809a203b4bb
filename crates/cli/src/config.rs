//! Configuration management for the CLI
//!
//! Values come from, in increasing priority: built-in defaults, the JSON
//! config file, `CAPACITY_*` environment variables, and command-line flags.

use anyhow::{Context, Result};
use capacity_lib::{EstimatorSettings, HealthPolicy, NodeRoleFilter, PodFetchPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Default output format
    pub format: Option<OutputFormat>,
    /// Node role filter: `all`, `KEY` or `KEY=VALUE`
    pub worker_label: Option<String>,
    /// Nodes aggregated at once
    pub concurrency: Option<usize>,
    /// `skip` or `abort`
    pub pod_fetch_policy: Option<String>,
    /// Monitored pressure conditions
    pub pressure_conditions: Option<Vec<String>>,
    /// Whether nodes must report Ready=True
    pub require_ready: Option<bool>,
}

/// Command-line values that override the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub worker_label: Option<String>,
    pub concurrency: Option<usize>,
    pub pod_fetch_policy: Option<String>,
}

impl Config {
    /// Load configuration from `path` (the default location when `None`)
    /// layered with `CAPACITY_*` environment variables. A missing file is
    /// not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("CAPACITY")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pressure_conditions"),
            )
            .build()
            .with_context(|| format!("Failed to load config {}", path.display()))?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home
            .join(".config")
            .join("cluster-capacity")
            .join("config.json"))
    }

    /// Build estimator settings, letting `overrides` win over file values
    pub fn estimator_settings(&self, overrides: &Overrides) -> Result<EstimatorSettings> {
        let mut settings = EstimatorSettings::default();

        if let Some(label) = overrides.worker_label.as_ref().or(self.worker_label.as_ref()) {
            let filter: NodeRoleFilter = label
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid worker label: {}", e))?;
            settings = settings.with_role_filter(filter);
        }

        if let Some(policy) = overrides
            .pod_fetch_policy
            .as_ref()
            .or(self.pod_fetch_policy.as_ref())
        {
            let policy: PodFetchPolicy = policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid pod fetch policy: {}", e))?;
            settings = settings.with_pod_fetch_policy(policy);
        }

        if let Some(concurrency) = overrides.concurrency.or(self.concurrency) {
            settings = settings.with_concurrency(concurrency);
        }

        let defaults = HealthPolicy::default();
        settings.health = HealthPolicy {
            pressure_conditions: self
                .pressure_conditions
                .clone()
                .unwrap_or(defaults.pressure_conditions),
            require_ready: self.require_ready.unwrap_or(defaults.require_ready),
        };

        Ok(settings)
    }
}

/// Where the kubeconfig comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigLocation {
    pub path: PathBuf,
    /// Named by `--kubeconfig` or `KUBECONFIG` rather than defaulted
    pub explicit: bool,
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<KubeconfigLocation> {
    if let Some(path) = override_path.filter(|p| !p.is_empty()) {
        return Ok(KubeconfigLocation {
            path: PathBuf::from(path),
            explicit: true,
        });
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        if !path.is_empty() {
            return Ok(KubeconfigLocation {
                path: PathBuf::from(path),
                explicit: true,
            });
        }
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(KubeconfigLocation {
        path: home.join(".kube").join("config"),
        explicit: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.format, None);
        assert_eq!(config.concurrency, None);
    }

    #[test]
    fn test_load_file() {
        let file = write_config(
            r#"{
                "format": "json",
                "worker_label": "node-role.kubernetes.io/node=true",
                "concurrency": 4,
                "pod_fetch_policy": "abort",
                "require_ready": false
            }"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.format, Some(OutputFormat::Json));
        assert_eq!(config.concurrency, Some(4));

        let settings = config.estimator_settings(&Overrides::default()).unwrap();
        assert_eq!(settings.role_filter, NodeRoleFilter::workers());
        assert_eq!(settings.pod_fetch_policy, PodFetchPolicy::Abort);
        assert_eq!(settings.concurrency, 4);
        assert!(!settings.health.require_ready);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let file = write_config("{ not json");
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_overrides_win() {
        let config = Config {
            worker_label: Some("pool=batch".to_string()),
            concurrency: Some(8),
            pod_fetch_policy: Some("abort".to_string()),
            ..Default::default()
        };
        let overrides = Overrides {
            worker_label: Some("all".to_string()),
            concurrency: Some(2),
            pod_fetch_policy: Some("skip".to_string()),
        };
        let settings = config.estimator_settings(&overrides).unwrap();
        assert_eq!(settings.role_filter, NodeRoleFilter::All);
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.pod_fetch_policy, PodFetchPolicy::SkipAndWarn);
    }

    #[test]
    fn test_defaults_without_values() {
        let settings = Config::default()
            .estimator_settings(&Overrides::default())
            .unwrap();
        assert_eq!(settings, EstimatorSettings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = Config {
            pod_fetch_policy: Some("retry".to_string()),
            ..Default::default()
        };
        assert!(config.estimator_settings(&Overrides::default()).is_err());

        let overrides = Overrides {
            worker_label: Some("=true".to_string()),
            ..Default::default()
        };
        assert!(Config::default().estimator_settings(&overrides).is_err());
    }

    #[test]
    fn test_kubeconfig_override() {
        let location = kubeconfig_path(Some("/tmp/kc")).unwrap();
        assert_eq!(location.path, PathBuf::from("/tmp/kc"));
        assert!(location.explicit);
    }
}
