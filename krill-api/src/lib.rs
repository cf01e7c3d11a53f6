//! Krill API - Embedding layer
//!
//! Provides the unified interface a host uses to run Krill programs:
//! - Program loading from JSON
//! - Execution with explicit configuration (RunConfig)
//! - Unified error handling (KrillError) and structured reports
//!
//! Configuration is passed explicitly; there is no global state.

use krill_log::{debug, error, info};

use krill_core::{Program, Vm};

pub mod config;
pub use config::RunConfig;

// Re-export config types from krill_config
pub use krill_config::{KrillConfig, LimitConfig, LogLevel, LoggingConfig, Phase, VmConfig};

pub mod error;
pub mod types;
pub use error::{ErrorReport, KrillError};
pub use types::ExecuteOutput;

// Re-export core types
pub use krill_config;
pub use krill_core;
pub use krill_core::{NativeRegistry, NativeSig, Value};

/// Parse a runtime configuration from JSON
pub fn load_config_json(text: &str) -> Result<KrillConfig, KrillError> {
    KrillConfig::from_json_str(text).map_err(|e| KrillError::Config(e.to_string()))
}

/// Load and validate a program from its JSON form
pub fn load_program_json(text: &str) -> Result<Program, KrillError> {
    Ok(Program::from_json(text)?)
}

/// Execute a loaded program with explicit configuration
///
/// This is the recommended API for library users.
pub fn run_program(program: &Program, config: &RunConfig) -> Result<ExecuteOutput, KrillError> {
    info!(config.logger, "Starting execution");

    let mut vm = Vm::with_options(program.clone(), config.vm_options())?;
    let result = match vm.run() {
        Ok(result) => result,
        Err(e) => {
            if let Some(ring) = &config.ring {
                error!(
                    config.logger,
                    "Execution failed, last {} log record(s) kept for dump",
                    ring.len()
                );
            }
            return Err(e.into());
        }
    };
    let output = vm.take_output();

    debug!(
        config.logger,
        "Execution finished: {} result slot(s), {} output line(s)",
        result.len(),
        output.len()
    );
    Ok(ExecuteOutput { result, output })
}

/// Load a program from JSON and execute it
pub fn run_json(text: &str, config: &RunConfig) -> Result<ExecuteOutput, KrillError> {
    let program = load_program_json(text)?;
    run_program(&program, config)
}
