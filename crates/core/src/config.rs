use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `SENDCRAFT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_step_job_name")]
    pub step_job_name: String,
    /// Upper bound on jobs processed in one worker drain pass.
    #[serde(default = "default_drain_limit")]
    pub drain_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_from_name")]
    pub default_from_name: String,
    #[serde(default = "default_message_id_prefix")]
    pub message_id_prefix: String,
}

// Default functions
fn default_page_size() -> usize {
    50
}
fn default_step_job_name() -> String {
    "automation.run_step".to_string()
}
fn default_drain_limit() -> usize {
    10_000
}
fn default_from_name() -> String {
    "Sendcraft".to_string()
}
fn default_message_id_prefix() -> String {
    "sc".to_string()
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            step_job_name: default_step_job_name(),
            drain_limit: default_drain_limit(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            default_from_name: default_from_name(),
            message_id_prefix: default_message_id_prefix(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            queue: QueueConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("SENDCRAFT")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.segmentation.page_size, 50);
        assert_eq!(config.queue.step_job_name, "automation.run_step");
        assert_eq!(config.mail.default_from_name, "Sendcraft");
    }
}
