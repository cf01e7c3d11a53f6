//! 日志配置：一键初始化日志器

use crate::{Level, LogRingBuffer, Logger};
use krill_config::LoggingConfig;
use std::sync::Arc;

/// 日志输出目标配置
#[derive(Clone, Debug, PartialEq)]
pub enum OutputConfig {
    /// 输出到标准输出
    #[cfg(feature = "stdout")]
    Stdout,
    /// 输出到标准错误
    #[cfg(feature = "stderr")]
    Stderr,
    /// 输出到环形缓冲区（容量）
    RingBuffer(usize),
}

/// 日志配置
///
/// ```
/// use krill_log::{LogConfig, Level};
///
/// let (logger, ring) = LogConfig::new(Level::Debug).with_ring_buffer(64).init();
/// assert!(logger.is_enabled(Level::Debug));
/// assert!(ring.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// 日志级别
    pub level: Level,
    /// 输出目标列表
    pub outputs: Vec<OutputConfig>,
}

impl LogConfig {
    /// 创建配置（无输出）
    pub fn new(level: Level) -> Self {
        Self {
            level,
            outputs: Vec::new(),
        }
    }

    /// 开发环境推荐配置：Debug 级别 + 10000 条环形缓冲区
    pub fn dev() -> Self {
        Self::new(Level::Debug).with_ring_buffer(10_000)
    }

    /// 测试环境配置（静默）
    pub fn test() -> Self {
        Self::new(Level::Error)
    }

    /// 从运行时配置构造
    pub fn from_logging(config: &LoggingConfig) -> Self {
        let base = Self::new(config.level.into());
        if config.ring_buffer > 0 {
            base.with_ring_buffer(config.ring_buffer)
        } else {
            base
        }
    }

    /// 添加 stderr 输出
    #[cfg(feature = "stderr")]
    pub fn with_stderr(mut self) -> Self {
        if !self.outputs.contains(&OutputConfig::Stderr) {
            self.outputs.push(OutputConfig::Stderr);
        }
        self
    }

    /// 添加 stdout 输出
    #[cfg(feature = "stdout")]
    pub fn with_stdout(mut self) -> Self {
        if !self.outputs.contains(&OutputConfig::Stdout) {
            self.outputs.push(OutputConfig::Stdout);
        }
        self
    }

    /// 添加环形缓冲区（同一配置只保留一个）
    pub fn with_ring_buffer(mut self, capacity: usize) -> Self {
        self.outputs
            .retain(|o| !matches!(o, OutputConfig::RingBuffer(_)));
        self.outputs.push(OutputConfig::RingBuffer(capacity));
        self
    }

    /// 初始化日志器，返回 (logger, 环形缓冲区句柄)
    pub fn init(self) -> (Arc<Logger>, Option<LogRingBuffer>) {
        let logger = Logger::new(self.level);
        let mut ring = None;
        for output in self.outputs {
            match output {
                #[cfg(feature = "stdout")]
                OutputConfig::Stdout => logger.add_sink(crate::StdoutSink),
                #[cfg(feature = "stderr")]
                OutputConfig::Stderr => logger.add_sink(crate::StderrSink),
                OutputConfig::RingBuffer(capacity) => {
                    let buffer = LogRingBuffer::new(capacity);
                    logger.add_sink(buffer.clone());
                    ring = Some(buffer);
                }
            }
        }
        (logger, ring)
    }
}
