//! Value 实现
//!
//! 解释器栈与容器中的通用数据单元。`Value` 是一个带标签的枚举：
//! 标量（整数、浮点、指令指针）与引用（持有堆对象所有权的 `ObjRef`）。
//!
//! 所有权纪律：
//! - `clone()` 即 *increment ownership*：复制到新的持有槽位时必须显式调用
//! - `drop` 即 *decrement ownership*：槽位被覆盖或离开作用域时自动发生
//!
//! `Value` 不是 `Copy`，因此每一次复制都在代码中可见。

use crate::object::ObjRef;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== 标量类型（构建时可配置）====================

/// 整数标量
#[cfg(not(feature = "value32"))]
pub type Int = i64;
/// 浮点标量
#[cfg(not(feature = "value32"))]
pub type Float = f64;

/// 整数标量（32 位构建）
#[cfg(feature = "value32")]
pub type Int = i32;
/// 浮点标量（32 位构建）
#[cfg(feature = "value32")]
pub type Float = f32;

/// 指令指针：字节码缓冲区中的下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InsPtr(pub u32);

impl InsPtr {
    /// 哨兵：主函数 / 协程入口帧的返回地址
    pub const END: InsPtr = InsPtr(u32::MAX);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value 的动态种类（用于诊断信息）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Nil,
    Int,
    Float,
    Ip,
    Ref,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Ip => "function",
            ValueKind::Ref => "reference",
        }
    }
}

/// 通用值
#[derive(Clone, Default)]
pub enum Value {
    /// 空引用（可空类型的 nil）
    #[default]
    Nil,
    Int(Int),
    Float(Float),
    /// 函数入口（闭包）
    Ip(InsPtr),
    /// 持有所有权的堆对象句柄
    Ref(ObjRef),
}

impl Value {
    // ==================== 构造方法 ====================

    #[inline]
    pub fn int(n: Int) -> Self {
        Value::Int(n)
    }

    #[inline]
    pub fn float(f: Float) -> Self {
        Value::Float(f)
    }

    #[inline]
    pub fn ip(ip: InsPtr) -> Self {
        Value::Ip(ip)
    }

    /// 布尔值编码为整数 0/1
    #[inline]
    pub fn bool(b: bool) -> Self {
        Value::Int(b as Int)
    }

    /// 从新分配的对象构造（对象计数为 1，归本槽位所有）
    #[inline]
    pub fn obj(obj: ObjRef) -> Self {
        Value::Ref(obj)
    }

    // ==================== 类型判断 ====================

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Ip(_) => ValueKind::Ip,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    #[inline]
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// 条件跳转使用的真值：0、0.0、nil 为假
    #[inline]
    pub fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Ip(_) | Value::Ref(_) => true,
        }
    }

    // ==================== 部分访问器 ====================
    //
    // 访问器类型不匹配说明编译器生成了错误的字节码，属于程序错误：直接 panic，
    // 字节码层无法捕获。

    #[inline]
    #[track_caller]
    pub fn ival(&self) -> Int {
        match self {
            Value::Int(n) => *n,
            other => wrong_kind("int", other),
        }
    }

    #[inline]
    #[track_caller]
    pub fn fval(&self) -> Float {
        match self {
            Value::Float(f) => *f,
            other => wrong_kind("float", other),
        }
    }

    #[inline]
    #[track_caller]
    pub fn ipval(&self) -> InsPtr {
        match self {
            Value::Ip(ip) => *ip,
            other => wrong_kind("function", other),
        }
    }

    #[inline]
    #[track_caller]
    pub fn as_obj(&self) -> &ObjRef {
        match self {
            Value::Ref(obj) => obj,
            other => wrong_kind("reference", other),
        }
    }

    #[inline]
    #[track_caller]
    pub fn into_obj(self) -> ObjRef {
        match self {
            Value::Ref(obj) => obj,
            other => wrong_kind("reference", &other),
        }
    }

    /// 可空引用：nil 返回 None
    #[inline]
    #[track_caller]
    pub fn as_nilable_obj(&self) -> Option<&ObjRef> {
        match self {
            Value::Nil => None,
            Value::Ref(obj) => Some(obj),
            other => wrong_kind("nilable reference", other),
        }
    }

    // ==================== 所有权 ====================

    /// 复制到新的持有槽位（引用计数 +1）
    #[inline]
    pub fn increment_ownership(&self) -> Value {
        self.clone()
    }

    /// 释放本槽位的所有权（引用计数 -1，归零时释放对象）
    #[inline]
    pub fn decrement_ownership(self) {
        drop(self)
    }

    /// 引用对象的当前计数；标量返回 None
    pub fn refc(&self) -> Option<usize> {
        match self {
            Value::Ref(obj) => Some(obj.refc()),
            _ => None,
        }
    }

    /// 身份比较：标量按值，引用按对象身份
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Ip(a), Value::Ip(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

#[cold]
#[track_caller]
fn wrong_kind(expected: &str, found: &Value) -> ! {
    panic!(
        "value accessor mismatch: expected {expected}, found {}",
        found.kind().as_str()
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl From<Int> for Value {
    fn from(n: Int) -> Self {
        Value::Int(n)
    }
}

impl From<Float> for Value {
    fn from(f: Float) -> Self {
        Value::Float(f)
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Ref(obj)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Ip(ip) => write!(f, "Ip({})", ip.0),
            Value::Ref(obj) => write!(f, "{obj:?}"),
        }
    }
}

// ==================== 测试 ====================
