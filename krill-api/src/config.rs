//! API 层配置
//!
//! 执行配置 RunConfig：限制、VM 选项、日志器与原生函数注册表

use krill_config::{KrillConfig, LimitConfig, VmConfig};
use krill_core::{NativeRegistry, VmOptions};
use krill_log::{LogConfig, LogRingBuffer, Logger};
use std::sync::Arc;

/// Execution configuration
#[derive(Clone)]
pub struct RunConfig {
    /// Execution limits
    pub limits: LimitConfig,
    /// VM tuning options
    pub vm: VmConfig,
    /// Logger shared with the VM
    pub logger: Arc<Logger>,
    /// Host functions available to programs
    pub natives: NativeRegistry,
    /// Crash-dump buffer attached to `logger`, if any
    pub ring: Option<LogRingBuffer>,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("limits", &self.limits)
            .field("vm", &self.vm)
            .field("natives", &self.natives)
            .field("ring", &self.ring.as_ref().map(LogRingBuffer::capacity))
            .finish()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limits: LimitConfig::default(),
            vm: VmConfig::default(),
            logger: Logger::noop(),
            natives: NativeRegistry::with_builtins(),
            ring: None,
        }
    }
}

impl RunConfig {
    /// Build a run configuration from a parsed [`KrillConfig`].
    ///
    /// The logger is initialized from `config.logging`; builtin natives are
    /// registered.
    pub fn from_config(config: &KrillConfig) -> Self {
        let (logger, ring) = LogConfig::from_logging(&config.logging).init();
        Self {
            limits: config.limits.clone(),
            vm: config.vm.clone(),
            logger,
            natives: NativeRegistry::with_builtins(),
            ring,
        }
    }

    /// Options for one VM instance
    pub fn vm_options(&self) -> VmOptions {
        VmOptions {
            limits: self.limits.clone(),
            vm: self.vm.clone(),
            logger: self.logger.clone(),
            natives: self.natives.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use krill_log::Level;

    #[test]
    fn test_default_run_config() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.limits, LimitConfig::default());
        assert!(cfg.natives.contains("divmod"));
        assert!(cfg.ring.is_none());
        assert!(!cfg.logger.is_enabled(Level::Warn));
    }

    #[test]
    fn test_from_config_with_ring_buffer() {
        let config = KrillConfig::from_json_str(
            r#"{"limits": {"max_call_depth": 32}, "logging": {"level": "debug", "ring_buffer": 8}}"#,
        )
        .unwrap();
        let cfg = RunConfig::from_config(&config);
        assert_eq!(cfg.limits.max_call_depth, 32);
        assert!(cfg.logger.is_enabled(Level::Debug));
        assert_eq!(cfg.ring.as_ref().map(LogRingBuffer::capacity), Some(8));

        let options = cfg.vm_options();
        assert_eq!(options.limits.max_call_depth, 32);
        assert_eq!(options.natives.len(), cfg.natives.len());
    }

    #[test]
    fn test_debug_skips_logger() {
        let text = format!("{:?}", RunConfig::default());
        assert!(text.starts_with("RunConfig"));
        assert!(!text.contains("logger"));
    }
}
