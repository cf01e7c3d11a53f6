//! 字符串、向量、结构体与装箱指令
//!
//! 元素宽度取自向量对象本身（创建时由类型表确定）；结构体字段偏移取自
//! 类型表。所有批量搬运都以展平后的 Value 为单位。

use super::Vm;
use crate::error::VmError;
use crate::object::{ObjRef, StructObj, VectorObj};
use crate::types::TypeIdx;
use crate::value::{Int, Value};

// ==================== 字符串 ====================

/// `SConcat`：`[a, b]` → 新字符串
pub(super) fn concat(vm: &mut Vm) -> Result<(), VmError> {
    let b = vm.pop_obj();
    let a = vm.pop_obj();
    let mut s = String::with_capacity(a.string().len() + b.string().len());
    s.push_str(a.as_str());
    s.push_str(b.as_str());
    vm.push(Value::obj(ObjRef::new_string(TypeIdx::STRING, &s)))
}

/// `SLen`：字节长度
pub(super) fn str_len(vm: &mut Vm) -> Result<(), VmError> {
    let s = vm.pop_obj();
    let len = s.string().len();
    vm.push(Value::int(len as Int))
}

/// `SEq`：按内容比较
pub(super) fn str_eq(vm: &mut Vm) -> Result<(), VmError> {
    let b = vm.pop_obj();
    let a = vm.pop_obj();
    vm.push(Value::bool(a.as_str() == b.as_str()))
}

// ==================== 向量 ====================

/// `NewVec { ty, n }`：栈顶 `n` 个展平元素成为新向量的内容
pub(super) fn new_vector(vm: &mut Vm, ty: TypeIdx, n: u16) -> Result<(), VmError> {
    let layout = vm.program.types.vector_layout(ty);
    let values = vm.pop_n(n as usize * layout.width);
    let mut v = VectorObj::new(&layout, 0, n as usize)?;
    v.append_values(values, n as usize)?;
    vm.push(Value::obj(ObjRef::new_vector(ty, v)))
}

/// 元素在栈上的宽度
fn elem_width(vec: &ObjRef) -> usize {
    vec.vector().width()
}

/// `VecPush`：`[elem, vec]`
pub(super) fn push(vm: &mut Vm) -> Result<(), VmError> {
    let vec = vm.pop_obj();
    let elem = vm.pop_n(elem_width(&vec));
    vec.vector_mut().push(elem)?;
    Ok(())
}

/// `VecPop`：`[vec]` → elem
pub(super) fn pop(vm: &mut Vm) -> Result<(), VmError> {
    let vec = vm.pop_obj();
    let elem = vec.vector_mut().pop()?;
    vm.push_all(elem)
}

/// `VecTop`：`[vec]` → elem（复制）
pub(super) fn top(vm: &mut Vm) -> Result<(), VmError> {
    let vec = vm.pop_obj();
    let elem = vec.vector().top()?.to_vec();
    vm.push_all(elem)
}

/// `VecInsert`：`[elem, vec, i]`
pub(super) fn insert(vm: &mut Vm) -> Result<(), VmError> {
    let i = vm.pop_int();
    let vec = vm.pop_obj();
    let elem = vm.pop_n(elem_width(&vec));
    vec.vector_mut().insert(i, elem)?;
    Ok(())
}

/// `VecRemove { count }`：`[vec, i]` → 第一个被移除的元素，其余释放
pub(super) fn remove(vm: &mut Vm, count: u16) -> Result<(), VmError> {
    let i = vm.pop_int();
    let vec = vm.pop_obj();
    let w = elem_width(&vec);
    let mut removed = vec.vector_mut().remove(i, Int::from(count))?;
    removed.truncate(w);
    vm.push_all(removed)
}

/// `VecAt`：`[vec, i]` → elem（复制）
pub(super) fn at(vm: &mut Vm) -> Result<(), VmError> {
    let i = vm.pop_int();
    let vec = vm.pop_obj();
    let elem = vec.vector().at(i)?.to_vec();
    vm.push_all(elem)
}

/// `VecSet`：`[elem, vec, i]`
pub(super) fn set(vm: &mut Vm) -> Result<(), VmError> {
    let i = vm.pop_int();
    let vec = vm.pop_obj();
    let elem = vm.pop_n(elem_width(&vec));
    vec.vector_mut().set(i, elem)?;
    Ok(())
}

pub(super) fn len(vm: &mut Vm) -> Result<(), VmError> {
    let vec = vm.pop_obj();
    let n = vec.vector().len();
    vm.push(Value::int(n as Int))
}

pub(super) fn capacity(vm: &mut Vm) -> Result<(), VmError> {
    let vec = vm.pop_obj();
    let n = vec.vector().capacity();
    vm.push(Value::int(n as Int))
}

/// `VecAppend`：`[dst, src, start, count]`
pub(super) fn append(vm: &mut Vm) -> Result<(), VmError> {
    let count = vm.pop_int();
    let start = vm.pop_int();
    let src = vm.pop_obj();
    let dst = vm.pop_obj();
    if dst.ptr_eq(&src) {
        // 同一对象：先复制出区间，避免同时借用
        let values = src.vector().slice(start, count)?.to_vec();
        dst.vector_mut().append_values(values, count as usize)?;
    } else {
        let other = src.vector();
        dst.vector_mut().append(&other, start, count)?;
    }
    Ok(())
}

/// `VecResize`：`[vec, cap]`
pub(super) fn resize(vm: &mut Vm) -> Result<(), VmError> {
    let cap = vm.pop_int();
    let vec = vm.pop_obj();
    vec.vector_mut().resize(cap)?;
    Ok(())
}

// ==================== 结构体 ====================

/// `NewStruct(ty)`：栈顶全部展平字段成为新结构体
pub(super) fn new_struct(vm: &mut Vm, ty: TypeIdx) -> Result<(), VmError> {
    let slots = vm.program.types.struct_slots(ty);
    let fields = vm.pop_n(slots);
    vm.push(Value::obj(ObjRef::new_struct(ty, StructObj::new(fields))))
}

/// `StructAt { ty, field }`：`[s]` → field
pub(super) fn field(vm: &mut Vm, ty: TypeIdx, field: u16) -> Result<(), VmError> {
    let (offset, width) = vm.program.types.field_offset(ty, field as usize);
    let s = vm.pop_obj();
    let values = s.structure().field(offset, width).to_vec();
    vm.push_all(values)
}

/// `StructReplace { ty, field }`：`[s, value]` → 新结构体，原结构体不变
pub(super) fn replace(vm: &mut Vm, ty: TypeIdx, field: u16) -> Result<(), VmError> {
    let (offset, width) = vm.program.types.field_offset(ty, field as usize);
    let values = vm.pop_n(width);
    let s = vm.pop_obj();
    let fresh = s.structure().replace(offset, values);
    vm.push(Value::obj(ObjRef::new_struct(s.type_index(), fresh)))
}

/// `InlineField { width, offset, count }`：从栈顶的内联结构体中取出一段
pub(super) fn inline_field(vm: &mut Vm, width: u16, offset: u16, count: u16) -> Result<(), VmError> {
    let whole = vm.pop_n(width as usize);
    let start = offset as usize;
    let part = whole
        .into_iter()
        .skip(start)
        .take(count as usize)
        .collect();
    vm.push_all(part)
}

// ==================== 装箱 ====================

pub(super) fn box_int(vm: &mut Vm) -> Result<(), VmError> {
    let n = vm.pop_int();
    vm.push(Value::obj(ObjRef::new_boxed_int(TypeIdx::BOXED_INT, n)))
}

pub(super) fn box_float(vm: &mut Vm) -> Result<(), VmError> {
    let f = vm.pop_float();
    vm.push(Value::obj(ObjRef::new_boxed_float(TypeIdx::BOXED_FLOAT, f)))
}

pub(super) fn unbox_int(vm: &mut Vm) -> Result<(), VmError> {
    let b = vm.pop_obj();
    vm.push(Value::int(b.boxed_int()))
}

pub(super) fn unbox_float(vm: &mut Vm) -> Result<(), VmError> {
    let b = vm.pop_obj();
    vm.push(Value::float(b.boxed_float()))
}
