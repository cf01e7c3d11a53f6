//! 结构体对象（引用语义的结构体）
//!
//! 字段内联存放，不存在独立的子分配；布局完全由类型表条目决定。
//! 按值结构体字段在这里同样被展平。

use crate::heap;
use crate::value::Value;
use std::mem;

#[derive(Debug)]
pub struct StructObj {
    fields: Box<[Value]>,
}

impl StructObj {
    /// 以展平的字段值创建（所有权转入）
    pub fn new(fields: Vec<Value>) -> Self {
        Self {
            fields: fields.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn fields(&self) -> &[Value] {
        &self.fields
    }

    /// 展平后的槽位数
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[inline]
    #[track_caller]
    pub fn at(&self, slot: usize) -> &Value {
        &self.fields[slot]
    }

    /// 字段切片 `[offset, offset + width)`
    #[inline]
    #[track_caller]
    pub fn field(&self, offset: usize, width: usize) -> &[Value] {
        &self.fields[offset..offset + width]
    }

    /// 替换一个字段，返回新的结构体；`self` 保持不变
    ///
    /// 其余字段被复制（引用字段计数 +1）。
    #[track_caller]
    pub fn replace(&self, offset: usize, values: Vec<Value>) -> StructObj {
        let end = offset + values.len();
        assert!(end <= self.fields.len(), "struct field slot out of layout");
        let mut fields: Vec<Value> = Vec::with_capacity(self.fields.len());
        fields.extend(self.fields[..offset].iter().cloned());
        fields.extend(values);
        fields.extend(self.fields[end..].iter().cloned());
        StructObj::new(fields)
    }
}

impl Drop for StructObj {
    fn drop(&mut self) {
        heap::release(mem::take(&mut self.fields).into_vec());
    }
}
