//! Krill Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Krill crates.

use serde::{Deserialize, Serialize};

/// Configuration for execution limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum number of value slots on the interpreter stack
    pub max_stack_size: usize,
    /// Maximum number of nested call frames
    pub max_call_depth: usize,
}

/// Configuration for VM sizing and diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Initial stack capacity
    pub initial_stack_size: usize,
    /// Initial call frame capacity
    pub initial_frames_capacity: usize,
    /// Log every executed instruction at trace level
    pub trace_execution: bool,
    /// Report objects still alive when the VM is dropped
    pub report_leaks: bool,
}

/// Log level as it appears in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level that reaches the sinks
    pub level: LogLevel,
    /// Capacity of the crash-dump ring buffer (0 disables it)
    pub ring_buffer: usize,
}

/// Aggregate configuration for one runtime instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrillConfig {
    pub limits: LimitConfig,
    pub vm: VmConfig,
    pub logging: LoggingConfig,
}

impl KrillConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Runtime phase enum for phase-specific log targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Load,
    Vm,
    Coroutine,
    Native,
}

impl Phase {
    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Vm => "vm",
            Phase::Coroutine => "coroutine",
            Phase::Native => "native",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> &'static str {
        match self {
            Phase::Load => "krill::load",
            Phase::Vm => "krill::vm",
            Phase::Coroutine => "krill::coroutine",
            Phase::Native => "krill::native",
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1 << 20,
            max_call_depth: 1024,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            initial_stack_size: 256,
            initial_frames_capacity: 64,
            trace_execution: false,
            report_leaks: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            ring_buffer: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_config() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.max_stack_size, 1 << 20);
        assert_eq!(cfg.max_call_depth, 1024);
    }

    #[test]
    fn test_default_vm_config() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.initial_stack_size, 256);
        assert!(!cfg.trace_execution);
        assert!(cfg.report_leaks);
    }

    #[test]
    fn test_phase_target() {
        assert_eq!(Phase::Load.as_str(), "load");
        assert_eq!(Phase::Coroutine.target(), "krill::coroutine");
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = KrillConfig::from_json_str(
            r#"{ "limits": { "max_call_depth": 16 }, "logging": { "level": "debug" } }"#,
        )
        .unwrap();
        assert_eq!(cfg.limits.max_call_depth, 16);
        assert_eq!(cfg.limits.max_stack_size, LimitConfig::default().max_stack_size);
        assert_eq!(cfg.logging.level, LogLevel::Debug);
        assert_eq!(cfg.vm, VmConfig::default());
    }

    #[test]
    fn test_from_json_rejects_bad_level() {
        assert!(KrillConfig::from_json_str(r#"{ "logging": { "level": "loud" } }"#).is_err());
    }
}
