//! API 类型定义
//!
//! 执行的输出类型。

use krill_core::Value;

/// 执行输出
#[derive(Debug)]
pub struct ExecuteOutput {
    /// 入口函数返回的槽位
    pub result: Vec<Value>,
    /// `PRINT` 与原生函数捕获的输出行
    pub output: Vec<String>,
}
