//! 字节码定义
//!
//! 指令是带类型的枚举，操作数只包含整数下标（类型、函数、字符串、原生函数、
//! 跳转目标），因此整个程序可以独立于进程地址序列化。
//!
//! 约定：`[a, b]` 表示执行前栈顶附近的布局（b 在最上面），结果压回栈顶。
//! 按值结构体在栈上占 `width` 个连续槽位。被消费的操作数其所有权随之释放。

mod program;

pub use program::{FunctionInfo, Label, Program, ProgramBuilder};

use crate::types::TypeIdx;
use crate::value::{Float, InsPtr, Int};
use serde::{Deserialize, Serialize};

/// 函数表下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncIdx(pub u32);

/// 字符串常量下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrIdx(pub u32);

/// 原生函数签名下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeIdx(pub u32);

impl FuncIdx {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StrIdx {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl NativeIdx {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// 指令
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // ==================== 栈与局部变量 ====================
    PushInt(Int),
    PushFloat(Float),
    PushNil,
    PushStr(StrIdx),
    /// 压入函数入口（闭包值）
    PushFun(FuncIdx),
    Pop,
    Dup,
    /// 读取当前帧的局部变量（相对帧基址）
    LoadLocal(u16),
    /// 弹出栈顶写入局部变量，旧值被释放
    StoreLocal(u16),

    // ==================== 整数运算（回绕）====================
    IAdd,
    ISub,
    IMul,
    /// 除数为 0 报告 DivisionByZero
    IDiv,
    IMod,
    INeg,
    ILt,
    ILe,
    IGt,
    IGe,
    IEq,
    INe,

    // ==================== 浮点运算（IEEE）====================
    FAdd,
    FSub,
    FMul,
    FDiv,
    FNeg,
    FLt,
    FLe,
    FGt,
    FGe,
    FEq,
    FNe,

    // ==================== 转换与逻辑 ====================
    I2F,
    F2I,
    Not,

    // ==================== 按值结构体分量运算 ====================
    /// `[a(w), b(w)]` → `a + b`
    IVAdd(u16),
    FVAdd(u16),
    /// `[a(w), s]` → `a * s`
    IVScale(u16),
    FVScale(u16),

    // ==================== 控制流 ====================
    Jump(InsPtr),
    /// 弹出条件，为假时跳转
    JumpIfFalse(InsPtr),
    /// 参数已在栈上
    Call(FuncIdx),
    /// `[args.., fn]` 间接调用
    CallDyn,
    /// 返回栈顶 n 个值
    Return(u16),
    CallNative(NativeIdx),
    /// 弹出条件，为假时报告 AssertionFailed(消息)
    Assert(StrIdx),
    /// 结束程序，返回栈顶
    Halt,

    // ==================== 字符串 ====================
    SConcat,
    SLen,
    SEq,

    // ==================== 向量 ====================
    /// 弹出 n 个元素创建向量，ty 是向量类型
    NewVec { ty: TypeIdx, n: u16 },
    /// `[elem, vec]`
    VecPush,
    /// `[vec]` → elem
    VecPop,
    /// `[vec]` → elem（复制）
    VecTop,
    /// `[elem, vec, i]`
    VecInsert,
    /// `[vec, i]` → 第一个被移除的元素
    VecRemove { count: u16 },
    /// `[vec, i]` → elem（复制）
    VecAt,
    /// `[elem, vec, i]`
    VecSet,
    VecLen,
    VecCap,
    /// `[dst, src, start, count]`
    VecAppend,
    /// `[vec, new_cap]`
    VecResize,

    // ==================== 结构体 ====================
    /// 弹出全部字段创建引用结构体
    NewStruct(TypeIdx),
    /// `[s]` → field
    StructAt { ty: TypeIdx, field: u16 },
    /// `[s, field]` → 新结构体
    StructReplace { ty: TypeIdx, field: u16 },
    /// 从栈顶 `width` 个槽位的按值结构体中取出 `[offset, offset + count)`
    InlineField { width: u16, offset: u16, count: u16 },

    // ==================== 装箱 ====================
    BoxInt,
    BoxFloat,
    UnboxInt,
    UnboxFloat,

    // ==================== 泛型操作（类型表驱动）====================
    /// `[a(w), b(w)]` → 0/1；deep 为假时引用按身份比较
    Eq { ty: TypeIdx, deep: bool },
    Hash(TypeIdx),
    ToStr(TypeIdx),
    Print(TypeIdx),

    // ==================== 协程 ====================
    /// 弹出参数创建协程，ty 是协程类型
    CoNew { func: FuncIdx, ty: TypeIdx },
    /// `[co, value]` → 下一个 yield 的值或返回值
    CoResume,
    Yield,
    /// `[co]` → 0/1
    CoDone,
    /// `[co]` → 入口帧局部变量
    CoLocal(u16),
}

impl Op {
    /// 跳转目标（用于校验与回填）
    pub fn jump_target(&self) -> Option<InsPtr> {
        match self {
            Op::Jump(t) | Op::JumpIfFalse(t) => Some(*t),
            _ => None,
        }
    }

    /// 指令名称
    pub fn name(&self) -> &'static str {
        match self {
            Op::PushInt(_) => "PUSH_INT",
            Op::PushFloat(_) => "PUSH_FLOAT",
            Op::PushNil => "PUSH_NIL",
            Op::PushStr(_) => "PUSH_STR",
            Op::PushFun(_) => "PUSH_FUN",
            Op::Pop => "POP",
            Op::Dup => "DUP",
            Op::LoadLocal(_) => "LOAD_LOCAL",
            Op::StoreLocal(_) => "STORE_LOCAL",
            Op::IAdd => "IADD",
            Op::ISub => "ISUB",
            Op::IMul => "IMUL",
            Op::IDiv => "IDIV",
            Op::IMod => "IMOD",
            Op::INeg => "INEG",
            Op::ILt => "ILT",
            Op::ILe => "ILE",
            Op::IGt => "IGT",
            Op::IGe => "IGE",
            Op::IEq => "IEQ",
            Op::INe => "INE",
            Op::FAdd => "FADD",
            Op::FSub => "FSUB",
            Op::FMul => "FMUL",
            Op::FDiv => "FDIV",
            Op::FNeg => "FNEG",
            Op::FLt => "FLT",
            Op::FLe => "FLE",
            Op::FGt => "FGT",
            Op::FGe => "FGE",
            Op::FEq => "FEQ",
            Op::FNe => "FNE",
            Op::I2F => "I2F",
            Op::F2I => "F2I",
            Op::Not => "NOT",
            Op::IVAdd(_) => "IVADD",
            Op::FVAdd(_) => "FVADD",
            Op::IVScale(_) => "IVSCALE",
            Op::FVScale(_) => "FVSCALE",
            Op::Jump(_) => "JUMP",
            Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Op::Call(_) => "CALL",
            Op::CallDyn => "CALL_DYN",
            Op::Return(_) => "RETURN",
            Op::CallNative(_) => "CALL_NATIVE",
            Op::Assert(_) => "ASSERT",
            Op::Halt => "HALT",
            Op::SConcat => "SCONCAT",
            Op::SLen => "SLEN",
            Op::SEq => "SEQ",
            Op::NewVec { .. } => "NEW_VEC",
            Op::VecPush => "VEC_PUSH",
            Op::VecPop => "VEC_POP",
            Op::VecTop => "VEC_TOP",
            Op::VecInsert => "VEC_INSERT",
            Op::VecRemove { .. } => "VEC_REMOVE",
            Op::VecAt => "VEC_AT",
            Op::VecSet => "VEC_SET",
            Op::VecLen => "VEC_LEN",
            Op::VecCap => "VEC_CAP",
            Op::VecAppend => "VEC_APPEND",
            Op::VecResize => "VEC_RESIZE",
            Op::NewStruct(_) => "NEW_STRUCT",
            Op::StructAt { .. } => "STRUCT_AT",
            Op::StructReplace { .. } => "STRUCT_REPLACE",
            Op::InlineField { .. } => "INLINE_FIELD",
            Op::BoxInt => "BOX_INT",
            Op::BoxFloat => "BOX_FLOAT",
            Op::UnboxInt => "UNBOX_INT",
            Op::UnboxFloat => "UNBOX_FLOAT",
            Op::Eq { .. } => "EQ",
            Op::Hash(_) => "HASH",
            Op::ToStr(_) => "TO_STR",
            Op::Print(_) => "PRINT",
            Op::CoNew { .. } => "CO_NEW",
            Op::CoResume => "CO_RESUME",
            Op::Yield => "YIELD",
            Op::CoDone => "CO_DONE",
            Op::CoLocal(_) => "CO_LOCAL",
        }
    }
}
