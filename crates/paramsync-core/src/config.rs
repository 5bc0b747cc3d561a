// ── Runtime engine configuration ──
//
// Describes how the engine talks to its peer and how hard it retries.
// Built by the caller (usually from `paramsync-config`) and handed to
// `Engine::new`; the core never reads config files.

use paramsync_api::wire::names;

use crate::backoff::BackoffConfig;
use crate::error::CoreError;

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// RPC method answering with the full parameter snapshot.
    pub snapshot_method: String,
    /// RPC method that writes a single parameter.
    pub write_method: String,
    /// Event carrying one parameter change.
    pub changed_event: String,
    /// Event carrying a batch of parameter changes.
    pub bulk_changed_event: String,
    /// Buffer depth of the change broadcast channel. Slow receivers that
    /// fall further behind than this observe a lag.
    pub change_channel_capacity: usize,
    pub backoff: BackoffConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_method: names::SNAPSHOT.to_owned(),
            write_method: names::SET.to_owned(),
            changed_event: names::PARAM_CHANGED.to_owned(),
            bulk_changed_event: names::PARAMS_CHANGED.to_owned(),
            change_channel_capacity: 256,
            backoff: BackoffConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        let names = [
            ("snapshot_method", &self.snapshot_method),
            ("write_method", &self.write_method),
            ("changed_event", &self.changed_event),
            ("bulk_changed_event", &self.bulk_changed_event),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(CoreError::Config {
                    message: format!("{field} must not be empty"),
                });
            }
        }
        if self.change_channel_capacity == 0 {
            return Err(CoreError::Config {
                message: "change_channel_capacity must be at least 1".into(),
            });
        }
        self.backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_standard_wire_names() {
        let config = EngineConfig::default();
        assert_eq!(config.snapshot_method, "params.snapshot");
        assert_eq!(config.changed_event, "param.changed");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_method_name_is_rejected() {
        let config = EngineConfig {
            write_method: "  ".into(),
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("write_method"));
    }
}
