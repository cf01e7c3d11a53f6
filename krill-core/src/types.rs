//! 类型表
//!
//! 执行前一次性构建、运行时不可变的类型 arena。条目按下标寻址，相互之间
//! 也只通过下标引用，因此可以独立于进程地址序列化。
//!
//! 前 6 个下标是内建类型（见 [`TypeIdx::INT`] 等），运行时新建的字符串、
//! 装箱值直接使用它们作为对象头部的类型下标。

use crate::error::LoadError;
use crate::object::{ObjKind, VecLayout};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// 类型表下标
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIdx(pub u32);

impl TypeIdx {
    pub const INT: TypeIdx = TypeIdx(0);
    pub const FLOAT: TypeIdx = TypeIdx(1);
    pub const STRING: TypeIdx = TypeIdx(2);
    pub const ANY: TypeIdx = TypeIdx(3);
    pub const BOXED_INT: TypeIdx = TypeIdx(4);
    pub const BOXED_FLOAT: TypeIdx = TypeIdx(5);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// 是否为每个类型表都有的内建条目
    #[inline]
    pub fn is_builtin(self) -> bool {
        self.index() < BUILTINS.len()
    }
}

/// 结构体布局
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructLayout {
    pub name: String,
    pub fields: Vec<TypeIdx>,
    /// 按值（内联）结构体：在栈上和容器里展平存放
    pub by_value: bool,
}

/// 闭包签名
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSig {
    pub args: Vec<TypeIdx>,
    pub rets: Vec<TypeIdx>,
}

/// 类型条目
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeInfo {
    Int,
    Float,
    String,
    /// 动态类型槽位（标量或装箱值）
    Any,
    /// 可空包装
    Nil(TypeIdx),
    Vector(TypeIdx),
    Struct(StructLayout),
    Function(FunctionSig),
    /// 协程，参数为 yield 类型
    Coroutine(TypeIdx),
    BoxedInt,
    BoxedFloat,
    Resource(String),
}

const BUILTINS: [TypeInfo; 6] = [
    TypeInfo::Int,
    TypeInfo::Float,
    TypeInfo::String,
    TypeInfo::Any,
    TypeInfo::BoxedInt,
    TypeInfo::BoxedFloat,
];

// ==================== 构建器 ====================

/// 只追加的类型表构建器
#[derive(Clone, Debug)]
pub struct TypeTableBuilder {
    entries: Vec<TypeInfo>,
}

impl Default for TypeTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTableBuilder {
    /// 创建构建器，内建类型已就位
    pub fn new() -> Self {
        Self {
            entries: BUILTINS.to_vec(),
        }
    }

    /// 追加条目，返回其下标
    pub fn push(&mut self, info: TypeInfo) -> TypeIdx {
        self.entries.push(info);
        TypeIdx((self.entries.len() - 1) as u32)
    }

    pub fn vector(&mut self, elem: TypeIdx) -> TypeIdx {
        self.push(TypeInfo::Vector(elem))
    }

    pub fn nilable(&mut self, inner: TypeIdx) -> TypeIdx {
        self.push(TypeInfo::Nil(inner))
    }

    pub fn structure(&mut self, name: &str, fields: &[TypeIdx], by_value: bool) -> TypeIdx {
        self.push(TypeInfo::Struct(StructLayout {
            name: name.to_string(),
            fields: fields.to_vec(),
            by_value,
        }))
    }

    pub fn coroutine(&mut self, yields: TypeIdx) -> TypeIdx {
        self.push(TypeInfo::Coroutine(yields))
    }

    pub fn resource(&mut self, name: &str) -> TypeIdx {
        self.push(TypeInfo::Resource(name.to_string()))
    }

    /// 校验并冻结
    pub fn build(self) -> Result<TypeTable, LoadError> {
        TypeTable::from_entries(self.entries)
    }
}

// ==================== 类型表 ====================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    InProgress,
    Done,
}

/// 不可变类型表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TypeInfo>", into = "Vec<TypeInfo>")]
pub struct TypeTable {
    entries: Vec<TypeInfo>,
    /// 该类型一个值展平后的槽位数
    widths: Vec<usize>,
    /// 结构体各字段的起始槽位；最后一项是字段总槽位数。非结构体为空
    offsets: Vec<Vec<usize>>,
}

impl TryFrom<Vec<TypeInfo>> for TypeTable {
    type Error = LoadError;

    fn try_from(entries: Vec<TypeInfo>) -> Result<Self, Self::Error> {
        Self::from_entries(entries)
    }
}

impl From<TypeTable> for Vec<TypeInfo> {
    fn from(table: TypeTable) -> Self {
        table.entries
    }
}

impl TypeTable {
    fn from_entries(entries: Vec<TypeInfo>) -> Result<Self, LoadError> {
        if entries.len() < BUILTINS.len() || entries[..BUILTINS.len()] != BUILTINS {
            return Err(LoadError::MissingBuiltinTypes);
        }

        let len = entries.len();
        let check = |at: usize, ti: TypeIdx| {
            if ti.index() < len {
                Ok(())
            } else {
                Err(LoadError::BadIndex {
                    what: "type",
                    at,
                    index: ti.0,
                })
            }
        };
        for (at, info) in entries.iter().enumerate() {
            match info {
                TypeInfo::Nil(t) => {
                    check(at, *t)?;
                    if matches!(entries[t.index()], TypeInfo::Nil(_)) {
                        return Err(LoadError::WrongTypeKind {
                            at,
                            index: t.0,
                            expected: "a non-nilable type",
                        });
                    }
                }
                TypeInfo::Vector(t) | TypeInfo::Coroutine(t) => check(at, *t)?,
                TypeInfo::Struct(layout) => {
                    for t in &layout.fields {
                        check(at, *t)?;
                    }
                }
                TypeInfo::Function(sig) => {
                    for t in sig.args.iter().chain(&sig.rets) {
                        check(at, *t)?;
                    }
                }
                _ => {}
            }
        }

        let mut visit = vec![Visit::New; len];
        let mut widths = vec![1; len];
        for i in 0..len {
            compute_width(&entries, i, &mut visit, &mut widths)?;
        }

        let offsets = entries
            .iter()
            .map(|info| match info {
                TypeInfo::Struct(layout) => {
                    let mut acc = 0;
                    let mut offs = Vec::with_capacity(layout.fields.len() + 1);
                    for f in &layout.fields {
                        offs.push(acc);
                        acc += widths[f.index()];
                    }
                    offs.push(acc);
                    offs
                }
                _ => Vec::new(),
            })
            .collect();

        Ok(Self {
            entries,
            widths,
            offsets,
        })
    }

    // ==================== 查询 ====================

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[track_caller]
    pub fn get(&self, ti: TypeIdx) -> &TypeInfo {
        &self.entries[ti.index()]
    }

    #[inline]
    pub fn try_get(&self, ti: TypeIdx) -> Option<&TypeInfo> {
        self.entries.get(ti.index())
    }

    /// 一个值展平后的槽位数：按值结构体为字段宽度之和，其余为 1
    #[inline]
    #[track_caller]
    pub fn width(&self, ti: TypeIdx) -> usize {
        self.widths[ti.index()]
    }

    /// 若干类型的宽度之和
    pub fn total_width(&self, types: &[TypeIdx]) -> usize {
        types.iter().map(|t| self.width(*t)).sum()
    }

    /// 该类型的槽位是否可能持有引用（需要计数）
    ///
    /// `any` 槽位可以存放装箱值；按值结构体取决于它的字段。
    pub fn is_ref(&self, ti: TypeIdx) -> bool {
        match self.get(ti) {
            TypeInfo::Int | TypeInfo::Float | TypeInfo::Function(_) => false,
            TypeInfo::Nil(inner) => self.is_ref(*inner),
            TypeInfo::Struct(layout) if layout.by_value => {
                layout.fields.iter().any(|f| self.is_ref(*f))
            }
            TypeInfo::Any
            | TypeInfo::Struct(_)
            | TypeInfo::String
            | TypeInfo::Vector(_)
            | TypeInfo::Coroutine(_)
            | TypeInfo::BoxedInt
            | TypeInfo::BoxedFloat
            | TypeInfo::Resource(_) => true,
        }
    }

    /// 按名字查找资源类型条目
    pub fn find_resource(&self, name: &str) -> Option<TypeIdx> {
        self.entries
            .iter()
            .position(|info| matches!(info, TypeInfo::Resource(n) if n == name))
            .map(|i| TypeIdx(i as u32))
    }

    #[track_caller]
    pub fn struct_layout(&self, ti: TypeIdx) -> &StructLayout {
        match self.get(ti) {
            TypeInfo::Struct(layout) => layout,
            other => panic!("type #{} is not a struct: {other:?}", ti.0),
        }
    }

    /// 结构体全部字段展平后的槽位数
    #[track_caller]
    pub fn struct_slots(&self, ti: TypeIdx) -> usize {
        self.struct_layout(ti);
        self.offsets[ti.index()].last().copied().unwrap_or(0)
    }

    /// 字段的 (起始槽位, 宽度)
    #[track_caller]
    pub fn field_offset(&self, ti: TypeIdx, field: usize) -> (usize, usize) {
        let layout = self.struct_layout(ti);
        let offs = &self.offsets[ti.index()];
        (offs[field], self.width(layout.fields[field]))
    }

    #[track_caller]
    pub fn vector_elem(&self, ti: TypeIdx) -> TypeIdx {
        match self.get(ti) {
            TypeInfo::Vector(elem) => *elem,
            other => panic!("type #{} is not a vector: {other:?}", ti.0),
        }
    }

    /// 向量类型的元素布局
    #[track_caller]
    pub fn vector_layout(&self, ti: TypeIdx) -> VecLayout {
        let elem = self.vector_elem(ti);
        VecLayout {
            elem_type: elem,
            width: self.width(elem),
            zero: self.zero_value(elem),
            holds_refs: self.is_ref(elem),
        }
    }

    /// 零值（展平，长度为 `width(ti)`）
    pub fn zero_value(&self, ti: TypeIdx) -> Vec<Value> {
        match self.get(ti) {
            TypeInfo::Int => vec![Value::int(0)],
            TypeInfo::Float => vec![Value::float(0.0)],
            TypeInfo::Struct(layout) if layout.by_value => layout
                .fields
                .iter()
                .flat_map(|f| self.zero_value(*f))
                .collect(),
            _ => vec![Value::Nil],
        }
    }

    /// 可读的类型名（诊断与打印）
    pub fn name(&self, ti: TypeIdx) -> String {
        match self.try_get(ti) {
            None => format!("<type #{}>", ti.0),
            Some(TypeInfo::Int) => "int".to_string(),
            Some(TypeInfo::Float) => "float".to_string(),
            Some(TypeInfo::String) => "string".to_string(),
            Some(TypeInfo::Any) => "any".to_string(),
            Some(TypeInfo::Nil(inner)) => format!("{}?", self.name(*inner)),
            Some(TypeInfo::Vector(elem)) => format!("[{}]", self.name(*elem)),
            Some(TypeInfo::Struct(layout)) => layout.name.clone(),
            Some(TypeInfo::Function(_)) => "function".to_string(),
            Some(TypeInfo::Coroutine(y)) => format!("coroutine<{}>", self.name(*y)),
            Some(TypeInfo::BoxedInt) => "boxed int".to_string(),
            Some(TypeInfo::BoxedFloat) => "boxed float".to_string(),
            Some(TypeInfo::Resource(name)) => format!("resource<{name}>"),
        }
    }

    // ==================== 动态校验（原生函数边界）====================

    /// 单个槽位的值是否符合类型
    pub fn admits(&self, ti: TypeIdx, v: &Value) -> bool {
        match self.get(ti) {
            TypeInfo::Any => true,
            TypeInfo::Int => matches!(v, Value::Int(_)),
            TypeInfo::Float => matches!(v, Value::Float(_)),
            TypeInfo::Function(_) => matches!(v, Value::Ip(_)),
            TypeInfo::Nil(inner) => v.is_nil() || self.admits(*inner, v),
            TypeInfo::Struct(layout) if layout.by_value => false,
            info => {
                let Value::Ref(obj) = v else {
                    return false;
                };
                match info {
                    TypeInfo::String => obj.kind() == ObjKind::String,
                    TypeInfo::Vector(elem) => {
                        obj.kind() == ObjKind::Vector && obj.vector().elem_type() == *elem
                    }
                    TypeInfo::Struct(_) => obj.kind() == ObjKind::Struct && obj.type_index() == ti,
                    TypeInfo::Coroutine(_) => obj.kind() == ObjKind::Coroutine,
                    TypeInfo::BoxedInt => obj.kind() == ObjKind::BoxedInt,
                    TypeInfo::BoxedFloat => obj.kind() == ObjKind::BoxedFloat,
                    TypeInfo::Resource(name) => {
                        obj.kind() == ObjKind::Resource && obj.resource().name() == name.as_str()
                    }
                    _ => false,
                }
            }
        }
    }

    /// 展平后的值是否符合类型（按值结构体逐字段检查）
    pub fn admits_flat(&self, ti: TypeIdx, vals: &[Value]) -> bool {
        if vals.len() != self.width(ti) {
            return false;
        }
        match self.get(ti) {
            TypeInfo::Struct(layout) if layout.by_value => {
                let offs = &self.offsets[ti.index()];
                layout.fields.iter().enumerate().all(|(i, f)| {
                    let start = offs[i];
                    self.admits_flat(*f, &vals[start..start + self.width(*f)])
                })
            }
            _ => self.admits(ti, &vals[0]),
        }
    }
}

fn compute_width(
    entries: &[TypeInfo],
    i: usize,
    visit: &mut [Visit],
    widths: &mut [usize],
) -> Result<usize, LoadError> {
    let layout = match &entries[i] {
        TypeInfo::Struct(layout) if layout.by_value => layout,
        _ => return Ok(1),
    };
    match visit[i] {
        Visit::Done => return Ok(widths[i]),
        Visit::InProgress => return Err(LoadError::RecursiveInlineStruct(layout.name.clone())),
        Visit::New => {}
    }
    visit[i] = Visit::InProgress;
    let mut total = 0;
    for f in &layout.fields {
        total += compute_width(entries, f.index(), visit, widths)?;
    }
    visit[i] = Visit::Done;
    widths[i] = total;
    Ok(total)
}
