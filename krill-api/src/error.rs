//! API 错误类型
//!
//! 提供统一的错误类型和结构化错误报告。

use krill_core::{LoadError, RunError, VmError};
use serde::Serialize;
use thiserror::Error;

/// Krill 错误类型
#[derive(Error, Debug)]
pub enum KrillError {
    /// 程序装载/校验错误
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// 运行时错误（已定位到函数和行号）
    #[error("Runtime error: {0}")]
    Runtime(#[from] RunError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(String),
}

impl KrillError {
    /// 错误阶段: load, runtime, config
    pub fn phase(&self) -> &'static str {
        match self {
            KrillError::Load(_) => "load",
            KrillError::Runtime(_) => "runtime",
            KrillError::Config(_) => "config",
        }
    }

    /// 获取错误行号（仅运行时错误，0 视为未知）
    pub fn line(&self) -> Option<u32> {
        match self {
            KrillError::Runtime(e) if e.line > 0 => Some(e.line),
            _ => None,
        }
    }

    /// 转换为结构化错误报告
    ///
    /// ```
    /// use krill_api::KrillError;
    ///
    /// let report = KrillError::Config("bad level".to_string()).to_report();
    /// assert_eq!(report.phase, "config");
    /// assert_eq!(report.to_string(), "[config] error: bad level");
    /// ```
    pub fn to_report(&self) -> ErrorReport {
        match self {
            KrillError::Load(e) => ErrorReport {
                phase: self.phase(),
                function: None,
                line: None,
                error_kind: load_error_kind(e).to_string(),
                message: e.to_string(),
                coroutine_depth: None,
            },
            KrillError::Runtime(e) => ErrorReport {
                phase: self.phase(),
                function: Some(e.function.clone()),
                line: self.line(),
                error_kind: vm_error_kind(&e.error).to_string(),
                message: e.error.to_string(),
                coroutine_depth: Some(e.coroutine_depth),
            },
            KrillError::Config(msg) => ErrorReport {
                phase: self.phase(),
                function: None,
                line: None,
                error_kind: "ConfigError".to_string(),
                message: msg.clone(),
                coroutine_depth: None,
            },
        }
    }
}

fn load_error_kind(e: &LoadError) -> &'static str {
    match e {
        LoadError::MissingBuiltinTypes => "MissingBuiltinTypes",
        LoadError::RecursiveInlineStruct(_) => "RecursiveInlineStruct",
        LoadError::BadIndex { .. } => "BadIndex",
        LoadError::WrongTypeKind { .. } => "WrongTypeKind",
        LoadError::BadFunction { .. } => "BadFunction",
        LoadError::LineTable { .. } => "LineTable",
        LoadError::UnboundLabel(_) => "UnboundLabel",
        LoadError::UnknownNative(_) => "UnknownNative",
        LoadError::NativeSignature { .. } => "NativeSignature",
        LoadError::Json(_) => "Json",
    }
}

fn vm_error_kind(e: &VmError) -> &'static str {
    match e {
        VmError::IndexOutOfRange { .. } => "IndexOutOfRange",
        VmError::EmptyVector => "EmptyVector",
        VmError::DivisionByZero => "DivisionByZero",
        VmError::AssertionFailed(_) => "AssertionFailed",
        VmError::NativeArity { .. } => "NativeArity",
        VmError::NativeType { .. } => "NativeType",
        VmError::NativeReturn { .. } => "NativeReturn",
        VmError::NativeReturnType { .. } => "NativeReturnType",
        VmError::Native(_) => "Native",
        VmError::ResourceType { .. } => "ResourceType",
        VmError::CoroutineState(_) => "CoroutineState",
        VmError::CoroutineRunning => "CoroutineRunning",
        VmError::YieldOutsideCoroutine => "YieldOutsideCoroutine",
        VmError::StackOverflow { .. } => "StackOverflow",
        VmError::OutOfMemory { .. } => "OutOfMemory",
    }
}

/// 结构化错误报告
///
/// 上层应用（CLI、宿主程序、日志收集）可以根据自己的需求格式化。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    /// 错误阶段: load, runtime, config
    pub phase: &'static str,
    /// 出错的函数（仅运行时）
    pub function: Option<String>,
    /// 源码行号（如果有）
    pub line: Option<u32>,
    /// 错误类型（可用于程序化处理）
    pub error_kind: String,
    /// 人类可读的错误消息
    pub message: String,
    /// 出错时活动协程链的深度（仅运行时）
    pub coroutine_depth: Option<usize>,
}

impl std::fmt::Display for ErrorReport {
    /// 默认的 CLI 友好格式
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.function, self.line) {
            (Some(function), Some(line)) => write!(
                f,
                "[{}:{}] {} error: {}",
                function, line, self.phase, self.message
            ),
            (Some(function), None) => {
                write!(f, "[{}] {} error: {}", function, self.phase, self.message)
            }
            _ => write!(f, "[{}] error: {}", self.phase, self.message),
        }
    }
}

impl ErrorReport {
    /// 转换为 JSON 格式
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 简洁格式（适合终端）
    pub fn to_short(&self) -> String {
        format!("{}: {}", self.phase, self.message)
    }
}
