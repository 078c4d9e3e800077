//! Configuration for the controller's deletion subsystem.

/// Configuration for a controller node's topic-deletion behavior.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cluster identifier, used to label controller log output.
    ///
    /// Default: "topicreaper-cluster"
    pub cluster_id: String,

    /// Whether topic deletion is enabled cluster-wide.
    ///
    /// When disabled, deletion-intent markers written by operators are
    /// purged on controller election and all later deletion operations are
    /// no-ops. Topic data and metadata are left untouched.
    ///
    /// Default: true
    pub delete_topic_enable: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_id: "topicreaper-cluster".to_string(),
            delete_topic_enable: true,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `CLUSTER_ID`: Cluster identifier (default: "topicreaper-cluster")
    /// - `DELETE_TOPIC_ENABLE`: Set to `false` or `0` to disable topic
    ///   deletion (default: enabled)
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let cluster_id =
            std::env::var("CLUSTER_ID").unwrap_or_else(|_| "topicreaper-cluster".to_string());

        let delete_topic_enable = std::env::var("DELETE_TOPIC_ENABLE")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true);

        let config = Self {
            cluster_id,
            delete_topic_enable,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.cluster_id.is_empty() {
            return Err("CLUSTER_ID must not be empty".into());
        }
        Ok(())
    }

    /// Create a config with topic deletion disabled.
    pub fn with_deletion_disabled(mut self) -> Self {
        self.delete_topic_enable = false;
        self
    }
}
