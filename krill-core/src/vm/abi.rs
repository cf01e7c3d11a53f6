//! 原生代码生成后端使用的入口
//!
//! 只暴露栈槽读写、计数增减和对象分配；类型表与协程内部不在此列。
//! 偏移量相对于当前帧的基址。

use super::Vm;
use crate::error::VmError;
use crate::object::{ObjRef, ResourceObj, ResourceType, StructObj, VectorObj};
use crate::types::{TypeIdx, TypeInfo};
use crate::value::Value;
use std::any::Any;

impl Vm {
    /// 共享栈当前的槽位数
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// 当前帧的基址
    pub fn frame_base(&self) -> usize {
        self.frame().base
    }

    /// 读取当前帧 `offset` 处的槽位（复制，引用计数 +1）
    #[track_caller]
    pub fn slot(&self, offset: usize) -> Value {
        self.stack[self.slot_index(offset)].clone()
    }

    /// 覆盖当前帧 `offset` 处的槽位，旧值被释放
    #[track_caller]
    pub fn set_slot(&mut self, offset: usize, v: Value) {
        let idx = self.slot_index(offset);
        self.stack[idx] = v;
    }

    #[track_caller]
    fn slot_index(&self, offset: usize) -> usize {
        let base = self.frames.last().map_or(0, |f| f.base);
        let idx = base + offset;
        assert!(idx < self.stack.len(), "slot {offset} outside the stack");
        idx
    }

    pub fn push_value(&mut self, v: Value) -> Result<(), VmError> {
        self.push(v)
    }

    #[track_caller]
    pub fn pop_value(&mut self) -> Value {
        self.pop()
    }

    /// 计数 +1
    pub fn increment(&self, v: &Value) -> Value {
        v.increment_ownership()
    }

    /// 计数 -1，归零时释放
    pub fn decrement(&self, v: Value) {
        v.decrement_ownership()
    }

    /// 分配字符串（计数为 1）
    pub fn alloc_string(&self, s: &str) -> Value {
        Value::obj(ObjRef::new_string(TypeIdx::STRING, s))
    }

    /// 用展平的元素值分配向量
    pub fn alloc_vector(&self, ty: TypeIdx, values: Vec<Value>) -> Result<Value, VmError> {
        let layout = self.program.types.vector_layout(ty);
        let n = match layout.width {
            0 => 0,
            w => {
                assert_eq!(values.len() % w, 0, "vector values are not a whole number of elements");
                values.len() / w
            }
        };
        let mut v = VectorObj::new(&layout, 0, n)?;
        v.append_values(values, n)?;
        Ok(Value::obj(ObjRef::new_vector(ty, v)))
    }

    /// 用展平的字段值分配结构体
    #[track_caller]
    pub fn alloc_struct(&self, ty: TypeIdx, fields: Vec<Value>) -> Value {
        let slots = self.program.types.struct_slots(ty);
        assert_eq!(fields.len(), slots, "struct `{}` takes {slots} slots", self.program.types.name(ty));
        debug_assert!(matches!(self.program.types.get(ty), TypeInfo::Struct(l) if !l.by_value));
        Value::obj(ObjRef::new_struct(ty, StructObj::new(fields)))
    }

    /// 分配资源对象；`ty` 必须是程序中声明的资源类型条目
    #[track_caller]
    pub fn alloc_resource(
        &self,
        ty: TypeIdx,
        rt: &'static ResourceType,
        payload: Box<dyn Any>,
    ) -> Value {
        match self.program.types.get(ty) {
            TypeInfo::Resource(name) if name == rt.name => {}
            other => panic!("type #{} is not resource `{}`: {other:?}", ty.0, rt.name),
        }
        Value::obj(ObjRef::new_resource(ty, ResourceObj::new(rt, payload)))
    }
}
