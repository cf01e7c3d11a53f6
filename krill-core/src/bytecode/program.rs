//! 程序：类型表 + 函数表 + 指令 + 常量，以及用于构造程序的汇编器

use super::{FuncIdx, NativeIdx, Op, StrIdx};
use crate::error::LoadError;
use crate::native::NativeSig;
use crate::types::{TypeIdx, TypeInfo, TypeTable};
use crate::value::InsPtr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 函数元数据
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub entry: InsPtr,
    /// 参数槽位数
    pub nargs: u16,
    /// 局部变量槽位数（含参数）
    pub nlocals: u16,
}

/// 装载后的不可变程序
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Program {
    pub types: TypeTable,
    pub functions: Vec<FunctionInfo>,
    pub code: Vec<Op>,
    /// 与 `code` 一一对应的源码行号
    pub lines: Vec<u32>,
    pub strings: Vec<String>,
    pub natives: Vec<NativeSig>,
    pub entry: FuncIdx,
}

impl Program {
    /// 从 JSON 装载并校验
    pub fn from_json(text: &str) -> Result<Program, LoadError> {
        let program: Program = serde_json::from_str(text)?;
        program.validate()?;
        Ok(program)
    }

    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[inline]
    #[track_caller]
    pub fn function(&self, f: FuncIdx) -> &FunctionInfo {
        &self.functions[f.index()]
    }

    /// 指令所在行（越界返回 0）
    pub fn line_at(&self, ip: usize) -> u32 {
        self.lines.get(ip).copied().unwrap_or(0)
    }

    /// 校验所有下标引用
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.lines.len() != self.code.len() {
            return Err(LoadError::LineTable {
                lines: self.lines.len(),
                code: self.code.len(),
            });
        }

        let bad = |what: &'static str, at: usize, index: u32| LoadError::BadIndex { what, at, index };

        // 函数表
        for f in &self.functions {
            if f.entry.index() >= self.code.len() {
                return Err(LoadError::BadFunction {
                    name: f.name.clone(),
                    reason: format!("entry {} outside code", f.entry.0),
                });
            }
            if f.nlocals < f.nargs {
                return Err(LoadError::BadFunction {
                    name: f.name.clone(),
                    reason: format!("{} locals for {} arguments", f.nlocals, f.nargs),
                });
            }
        }
        let main = self
            .functions
            .get(self.entry.index())
            .ok_or(bad("function", 0, self.entry.0))?;
        if main.nargs != 0 {
            return Err(LoadError::BadFunction {
                name: main.name.clone(),
                reason: "entry function takes arguments".to_string(),
            });
        }

        // 原生签名
        for (at, sig) in self.natives.iter().enumerate() {
            for t in sig.args.iter().chain(&sig.rets) {
                if self.types.try_get(*t).is_none() {
                    return Err(bad("type", at, t.0));
                }
            }
        }

        // 指令
        for (at, op) in self.code.iter().enumerate() {
            self.validate_op(at, op)?;
        }
        Ok(())
    }

    fn validate_op(&self, at: usize, op: &Op) -> Result<(), LoadError> {
        let bad = |what: &'static str, index: u32| LoadError::BadIndex { what, at, index };
        let func = |f: FuncIdx| {
            if f.index() < self.functions.len() {
                Ok(())
            } else {
                Err(bad("function", f.0))
            }
        };
        let ty = |t: TypeIdx| self.types.try_get(t).ok_or(bad("type", t.0));
        let wrong = |t: TypeIdx, expected: &'static str| LoadError::WrongTypeKind {
            at,
            index: t.0,
            expected,
        };

        match *op {
            Op::PushStr(s) | Op::Assert(s) => {
                if s.index() >= self.strings.len() {
                    return Err(bad("string", s.0));
                }
            }
            Op::PushFun(f) | Op::Call(f) => func(f)?,
            Op::CallNative(n) => {
                if n.index() >= self.natives.len() {
                    return Err(bad("native", n.0));
                }
            }
            Op::Jump(t) | Op::JumpIfFalse(t) => {
                if t.index() >= self.code.len() {
                    return Err(bad("jump", t.0));
                }
            }
            Op::NewVec { ty: t, .. } => {
                if !matches!(ty(t)?, TypeInfo::Vector(_)) {
                    return Err(wrong(t, "a vector"));
                }
            }
            Op::VecRemove { count: 0 } => return Err(bad("count", 0)),
            Op::NewStruct(t) => match ty(t)? {
                TypeInfo::Struct(layout) if !layout.by_value => {}
                _ => return Err(wrong(t, "a reference struct")),
            },
            Op::StructAt { ty: t, field } | Op::StructReplace { ty: t, field } => match ty(t)? {
                TypeInfo::Struct(layout) if !layout.by_value => {
                    if field as usize >= layout.fields.len() {
                        return Err(bad("field", field as u32));
                    }
                }
                _ => return Err(wrong(t, "a reference struct")),
            },
            Op::InlineField {
                width,
                offset,
                count,
            } => {
                if offset as usize + count as usize > width as usize {
                    return Err(bad("field", offset as u32));
                }
            }
            Op::CoNew { func: f, ty: t } => {
                func(f)?;
                if !matches!(ty(t)?, TypeInfo::Coroutine(_)) {
                    return Err(wrong(t, "a coroutine"));
                }
            }
            Op::Eq { ty: t, .. } | Op::Hash(t) | Op::ToStr(t) | Op::Print(t) => {
                ty(t)?;
            }
            _ => {}
        }
        Ok(())
    }
}

// ==================== 汇编器 ====================

/// 跳转标签
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Label(u32);

/// 程序构建器
///
/// ```
/// use krill_core::{Op, ProgramBuilder, TypeTableBuilder};
///
/// let types = TypeTableBuilder::new().build().unwrap();
/// let mut b = ProgramBuilder::new(types);
/// let main = b.function("main", 0, 0);
/// b.begin(main);
/// b.emit(Op::PushInt(40), 1);
/// b.op(Op::PushInt(2));
/// b.op(Op::IAdd);
/// b.op(Op::Return(1));
/// let program = b.finish().unwrap();
/// assert_eq!(program.code.len(), 4);
/// ```
#[derive(Debug)]
pub struct ProgramBuilder {
    types: TypeTable,
    functions: Vec<FunctionInfo>,
    code: Vec<Op>,
    lines: Vec<u32>,
    strings: Vec<String>,
    string_ids: HashMap<String, StrIdx>,
    natives: Vec<NativeSig>,
    labels: Vec<Option<InsPtr>>,
    patches: Vec<(usize, Label)>,
    line: u32,
    entry: Option<FuncIdx>,
}

impl ProgramBuilder {
    pub fn new(types: TypeTable) -> Self {
        Self {
            types,
            functions: Vec::new(),
            code: Vec::new(),
            lines: Vec::new(),
            strings: Vec::new(),
            string_ids: HashMap::new(),
            natives: Vec::new(),
            labels: Vec::new(),
            patches: Vec::new(),
            line: 0,
            entry: None,
        }
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// 声明函数（入口在 [`ProgramBuilder::begin`] 时确定），允许前向引用
    pub fn function(&mut self, name: &str, nargs: u16, nlocals: u16) -> FuncIdx {
        self.functions.push(FunctionInfo {
            name: name.to_string(),
            entry: InsPtr::END,
            nargs,
            nlocals: nlocals.max(nargs),
        });
        FuncIdx((self.functions.len() - 1) as u32)
    }

    /// 函数体从当前位置开始
    pub fn begin(&mut self, f: FuncIdx) {
        self.functions[f.index()].entry = self.here();
    }

    /// 设置入口函数（默认为第一个声明的函数）
    pub fn entry(&mut self, f: FuncIdx) {
        self.entry = Some(f);
    }

    /// 下一条指令的位置
    pub fn here(&self) -> InsPtr {
        InsPtr(self.code.len() as u32)
    }

    /// 写入指令
    pub fn emit(&mut self, op: Op, line: u32) -> usize {
        self.line = line;
        self.code.push(op);
        self.lines.push(line);
        self.code.len() - 1
    }

    /// 写入指令，行号沿用上一条
    pub fn op(&mut self, op: Op) -> usize {
        self.emit(op, self.line)
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label((self.labels.len() - 1) as u32)
    }

    /// 把标签绑定到当前位置
    pub fn bind(&mut self, label: Label) {
        self.labels[label.0 as usize] = Some(self.here());
    }

    pub fn jump(&mut self, label: Label) {
        let at = self.op(Op::Jump(InsPtr::END));
        self.patches.push((at, label));
    }

    pub fn jump_if_false(&mut self, label: Label) {
        let at = self.op(Op::JumpIfFalse(InsPtr::END));
        self.patches.push((at, label));
    }

    /// 字符串常量（去重）
    pub fn string(&mut self, s: &str) -> StrIdx {
        if let Some(id) = self.string_ids.get(s) {
            return *id;
        }
        let id = StrIdx(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        id
    }

    pub fn native(&mut self, sig: NativeSig) -> NativeIdx {
        self.natives.push(sig);
        NativeIdx((self.natives.len() - 1) as u32)
    }

    /// 回填跳转、校验并产出程序
    pub fn finish(mut self) -> Result<Program, LoadError> {
        for (at, label) in std::mem::take(&mut self.patches) {
            let target = self.labels[label.0 as usize].ok_or(LoadError::UnboundLabel(label.0))?;
            match &mut self.code[at] {
                Op::Jump(t) | Op::JumpIfFalse(t) => *t = target,
                _ => unreachable!("patch site is always a jump"),
            }
        }
        let program = Program {
            types: self.types,
            functions: self.functions,
            code: self.code,
            lines: self.lines,
            strings: self.strings,
            natives: self.natives,
            entry: self.entry.unwrap_or(FuncIdx(0)),
        };
        program.validate()?;
        Ok(program)
    }
}
