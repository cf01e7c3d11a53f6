//! krill-log - 结构化日志系统
//!
//! 为 Krill 运行时设计的结构化日志系统，特点：
//! - **显式传递**：无全局 logger，`Arc<Logger>` 通过参数传入
//! - **惰性格式化**：级别未启用时不产生任何格式化开销
//! - **崩溃转储**：环形缓冲区保留最后 N 条日志，运行时出错后可导出
//!
//! # 快速开始
//!
//! ```
//! use krill_log::{debug, LogConfig, Level};
//!
//! let (logger, ring) = LogConfig::new(Level::Debug).with_ring_buffer(128).init();
//! debug!(logger, "vm started with {} slots", 256);
//! assert_eq!(ring.unwrap().len(), 1);
//! ```

mod config;
mod logger;
mod macros;
mod record;
mod ring_buffer;

pub use config::{LogConfig, OutputConfig};
pub use logger::{LogSink, Logger};
#[cfg(feature = "stderr")]
pub use logger::StderrSink;
#[cfg(feature = "stdout")]
pub use logger::StdoutSink;
pub use record::{Level, Record};
pub use ring_buffer::LogRingBuffer;

/// 日志系统错误类型
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 无法识别的日志级别名称
    #[error("unknown log level: {0}")]
    UnknownLevel(String),
}
