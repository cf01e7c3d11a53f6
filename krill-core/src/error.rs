//! 错误类型 (Core 层)
//!
//! - [`LoadError`]：程序/类型表装载校验失败
//! - [`VmError`]：用户级运行时错误与资源耗尽，可报告，展开到顶层处理器
//! - [`RunError`]：带函数名和行号的 `VmError`，由 `Vm::run` 返回
//!
//! 程序错误（访问器类型不匹配、重复释放、协程状态机被破坏）不在这里，
//! 它们直接 panic。

use crate::object::CoState;
use thiserror::Error;

/// 运行时错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    /// 索引越界
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    /// 从空向量中取元素
    #[error("vector is empty")]
    EmptyVector,

    /// 整数除零
    #[error("division by zero")]
    DivisionByZero,

    /// 断言失败
    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    /// 原生函数参数个数不符
    #[error("native `{name}` expects {expected} argument slots, got {got}")]
    NativeArity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// 原生函数参数类型不符
    #[error("native `{name}` argument {index}: expected {expected}, got {got}")]
    NativeType {
        name: String,
        index: usize,
        expected: String,
        got: String,
    },

    /// 原生函数返回的槽位数与签名不符
    #[error("native `{name}` returned {got} slots, signature declares {expected}")]
    NativeReturn {
        name: String,
        expected: usize,
        got: usize,
    },

    /// 原生函数返回值的类型与签名不符
    #[error("native `{name}` return value {index}: expected {expected}, got {got}")]
    NativeReturnType {
        name: String,
        index: usize,
        expected: String,
        got: String,
    },

    /// 原生函数自行报告的错误
    #[error("{0}")]
    Native(String),

    /// 资源类型不符
    #[error("resource type mismatch: expected `{expected}`, got `{got}`")]
    ResourceType {
        expected: &'static str,
        got: &'static str,
    },

    /// 协程状态不允许该操作
    #[error("coroutine is {0:?}")]
    CoroutineState(CoState),

    /// 运行中的协程的局部变量不可访问
    #[error("cannot access locals of a running coroutine")]
    CoroutineRunning,

    /// 在协程之外 yield
    #[error("yield outside of a coroutine")]
    YieldOutsideCoroutine,

    /// 栈或调用深度超出上限
    #[error("stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    /// 分配失败
    #[error("out of memory (requested {requested} slots)")]
    OutOfMemory { requested: usize },
}

/// 带位置信息的运行时错误
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{function}:{line}: {error}")]
pub struct RunError {
    pub error: VmError,
    /// 出错时所在的函数
    pub function: String,
    /// 源码行号（0 表示未知）
    pub line: u32,
    /// 出错时活动协程链的深度
    pub coroutine_depth: usize,
}

/// 装载错误
#[derive(Debug, Error)]
pub enum LoadError {
    /// 类型表缺少内建条目
    #[error("type table does not start with the builtin types")]
    MissingBuiltinTypes,

    /// 按值结构体直接或间接包含自身
    #[error("inline struct `{0}` contains itself")]
    RecursiveInlineStruct(String),

    /// 下标越界（what: type/function/string/native/jump）
    #[error("{what} index {index} out of range at #{at}")]
    BadIndex {
        what: &'static str,
        at: usize,
        index: u32,
    },

    /// 下标指向的类型种类不符
    #[error("type #{index} at #{at} is not {expected}")]
    WrongTypeKind {
        at: usize,
        index: u32,
        expected: &'static str,
    },

    /// 函数元数据不合法
    #[error("function `{name}`: {reason}")]
    BadFunction { name: String, reason: String },

    /// 行号表与指令数不一致
    #[error("line table has {lines} entries for {code} instructions")]
    LineTable { lines: usize, code: usize },

    /// 标签未绑定
    #[error("label {0} was never bound")]
    UnboundLabel(u32),

    /// 程序引用的原生函数未注册
    #[error("unknown native function `{0}`")]
    UnknownNative(String),

    /// 程序声明的原生函数签名与注册的签名不一致
    #[error("native `{name}` is registered as {registered}, program declares {declared}")]
    NativeSignature {
        name: String,
        registered: String,
        declared: String,
    },

    /// JSON 解析失败
    #[error("invalid program json: {0}")]
    Json(#[from] serde_json::Error),
}
