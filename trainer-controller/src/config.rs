//! Typed YAML configuration, loaded once at startup and validated before
//! the reconciler starts.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Watch a single namespace, or every namespace when empty.
    pub watch_namespace: String,
    /// How many `TrainJob`s the controller reconciles concurrently.
    pub max_concurrent_reconciles: usize,
    /// Requeue interval for `TrainJob`s with an active-deadline timer or a
    /// TTL-after-finished timer still pending.
    pub requeue_after_seconds: u64,
    pub metrics_bind_address: String,
    pub health_bind_address: String,
    pub webhook: WebhookConfig,
    pub metrics: MetricsConfig,
    pub health: HealthConfig,
    pub leader_election: LeaderElectionConfig,
    pub client_connection: ClientConnectionConfig,
    pub controller: ControllerConfig,
    pub cert_management: CertManagementConfig,
    pub progress_server: ProgressServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_namespace: String::new(),
            max_concurrent_reconciles: 4,
            requeue_after_seconds: 30,
            metrics_bind_address: "0.0.0.0:8080".to_string(),
            health_bind_address: "0.0.0.0:8081".to_string(),
            webhook: WebhookConfig::default(),
            metrics: MetricsConfig::default(),
            health: HealthConfig::default(),
            leader_election: LeaderElectionConfig::default(),
            client_connection: ClientConnectionConfig::default(),
            controller: ControllerConfig::default(),
            cert_management: CertManagementConfig::default(),
            progress_server: ProgressServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    pub port: u16,
    pub host: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            port: 9443,
            host: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    pub bind_address: String,
    pub secure_serving: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            secure_serving: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthConfig {
    pub health_probe_bind_address: String,
    pub readiness_endpoint_name: String,
    pub liveness_endpoint_name: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            health_probe_bind_address: "0.0.0.0:8081".to_string(),
            readiness_endpoint_name: "readyz".to_string(),
            liveness_endpoint_name: "healthz".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaderElectionConfig {
    pub leader_elect: bool,
    pub resource_name: String,
    pub resource_namespace: String,
    pub resource_lock: String,
    pub lease_duration_seconds: u64,
    pub renew_deadline_seconds: u64,
    pub retry_period_seconds: u64,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            leader_elect: true,
            resource_name: "trainer-controller-leader".to_string(),
            resource_namespace: "kubeflow-system".to_string(),
            resource_lock: "leases".to_string(),
            lease_duration_seconds: 15,
            renew_deadline_seconds: 10,
            retry_period_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConnectionConfig {
    pub qps: f32,
    pub burst: i32,
}

impl Default for ClientConnectionConfig {
    fn default() -> Self {
        Self {
            qps: 50.0,
            burst: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Worker count per GroupKind (e.g. `"TrainJob.trainer.kubeflow.org"`),
    /// all entries must be `>= 1`.
    pub group_kind_concurrency: BTreeMap<String, u32>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            group_kind_concurrency: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertManagementConfig {
    pub enable: bool,
    pub webhook_service_name: String,
    pub webhook_secret_name: String,
}

impl Default for CertManagementConfig {
    fn default() -> Self {
        Self {
            enable: true,
            webhook_service_name: "trainer-controller-webhook-service".to_string(),
            webhook_secret_name: "trainer-controller-webhook-cert".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressServerConfig {
    pub bind_address: String,
    pub tls_cert_path: String,
    pub tls_key_path: String,
    pub max_body_bytes: usize,
    pub request_timeout_seconds: u64,
    pub port: u16,
    pub qps: f32,
    pub burst: i32,
}

impl Default for ProgressServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls_cert_path: "/etc/trainer/tls/tls.crt".to_string(),
            tls_key_path: "/etc/trainer/tls/tls.key".to_string(),
            max_body_bytes: 64 * 1024,
            request_timeout_seconds: 10,
            port: 8443,
            qps: 50.0,
            burst: 100,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_reconciles == 0 {
            return Err(ConfigError::Invalid(
                "maxConcurrentReconciles must be at least 1".to_string(),
            ));
        }
        if self.progress_server.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "progressServer.maxBodyBytes must be at least 1".to_string(),
            ));
        }
        if self.webhook.port == 0 {
            return Err(ConfigError::Invalid(
                "webhook.port must be in 1..=65535".to_string(),
            ));
        }
        if self.client_connection.qps < 0.0 {
            return Err(ConfigError::Invalid(
                "clientConnection.qps must be non-negative".to_string(),
            ));
        }
        if self.client_connection.burst < 0 {
            return Err(ConfigError::Invalid(
                "clientConnection.burst must be non-negative".to_string(),
            ));
        }
        for (group_kind, workers) in &self.controller.group_kind_concurrency {
            if *workers < 1 {
                return Err(ConfigError::Invalid(format!(
                    "controller.groupKindConcurrency[{group_kind}] must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.max_concurrent_reconciles = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_yaml_over_defaults() {
        let yaml = "watchNamespace: kubeflow\nmaxConcurrentReconciles: 8\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.watch_namespace, "kubeflow");
        assert_eq!(config.max_concurrent_reconciles, 8);
        assert_eq!(config.metrics_bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn webhook_port_zero_is_rejected() {
        let mut config = Config::default();
        config.webhook.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_qps_is_rejected() {
        let mut config = Config::default();
        config.client_connection.qps = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_burst_is_rejected() {
        let mut config = Config::default();
        config.client_connection.burst = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_group_kind_concurrency_is_rejected() {
        let mut config = Config::default();
        config
            .controller
            .group_kind_concurrency
            .insert("TrainJob.trainer.kubeflow.org".to_string(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn group_kind_concurrency_parses_from_yaml() {
        let yaml = "controller:\n  groupKindConcurrency:\n    TrainJob.trainer.kubeflow.org: 4\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.controller.group_kind_concurrency["TrainJob.trainer.kubeflow.org"],
            4
        );
    }
}
