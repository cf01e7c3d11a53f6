//! 向量对象
//!
//! 连续缓冲区，每个逻辑元素占 `width` 个 Value（按值结构体被展平）。
//! 所有批量操作都以 `width` 为步长搬运。容量按倍增扩展，最小为 4。

use crate::error::VmError;
use crate::heap;
use crate::types::TypeIdx;
use crate::value::{Int, Value};
use std::mem;

/// 最小非零容量
const MIN_CAPACITY: usize = 4;

/// 向量的元素布局（由类型表计算）
#[derive(Clone, Debug)]
pub struct VecLayout {
    /// 元素类型
    pub elem_type: TypeIdx,
    /// 每个元素展平后的 Value 个数
    pub width: usize,
    /// 元素零值（长度为 `width`）
    pub zero: Vec<Value>,
    /// 元素槽位是否可能持有引用
    pub holds_refs: bool,
}

/// 向量对象
#[derive(Debug)]
pub struct VectorObj {
    elem_type: TypeIdx,
    width: usize,
    holds_refs: bool,
    len: usize,
    cap: usize,
    /// 始终满足 `buf.len() == len * width`
    buf: Vec<Value>,
}

impl VectorObj {
    /// 创建长度为 `initial_len` 的向量，元素填充零值
    pub fn new(layout: &VecLayout, initial_len: usize, capacity: usize) -> Result<Self, VmError> {
        debug_assert_eq!(layout.zero.len(), layout.width);
        let mut v = Self {
            elem_type: layout.elem_type,
            width: layout.width,
            holds_refs: layout.holds_refs,
            len: 0,
            cap: 0,
            buf: Vec::new(),
        };
        v.set_capacity(capacity.max(initial_len))?;
        for _ in 0..initial_len {
            v.buf.extend(layout.zero.iter().cloned());
        }
        v.len = initial_len;
        Ok(v)
    }

    // ==================== 查询 ====================

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn elem_type(&self) -> TypeIdx {
        self.elem_type
    }

    /// 展平后的全部元素
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.buf
    }

    /// 第 `i` 个元素（越界为可报告的运行时错误）
    pub fn at(&self, i: Int) -> Result<&[Value], VmError> {
        let i = self.check_index(i)?;
        Ok(self.elem(i))
    }

    /// 最后一个元素
    pub fn top(&self) -> Result<&[Value], VmError> {
        if self.len == 0 {
            return Err(VmError::EmptyVector);
        }
        Ok(self.elem(self.len - 1))
    }

    /// `[start, start + count)` 区间的元素
    pub fn slice(&self, start: Int, count: Int) -> Result<&[Value], VmError> {
        let (start, count) = self.check_range(start, count)?;
        let w = self.width;
        Ok(&self.buf[start * w..(start + count) * w])
    }

    // ==================== 修改 ====================

    /// 追加一个元素（元素的所有权转入向量）
    pub fn push(&mut self, elem: impl IntoIterator<Item = Value>) -> Result<(), VmError> {
        self.grow_for(1)?;
        let before = self.buf.len();
        self.buf.extend(elem);
        self.assert_width(self.buf.len() - before);
        self.len += 1;
        Ok(())
    }

    /// 弹出最后一个元素（所有权转给调用方，计数不变）
    pub fn pop(&mut self) -> Result<Vec<Value>, VmError> {
        if self.len == 0 {
            return Err(VmError::EmptyVector);
        }
        self.len -= 1;
        Ok(self.buf.split_off(self.len * self.width))
    }

    /// 覆盖第 `i` 个元素，旧值被释放
    pub fn set(&mut self, i: Int, elem: impl IntoIterator<Item = Value>) -> Result<(), VmError> {
        let i = self.check_index(i)?;
        let w = self.width;
        let mut written = 0;
        for (slot, v) in self.buf[i * w..(i + 1) * w].iter_mut().zip(elem) {
            *slot = v;
            written += 1;
        }
        self.assert_width(written);
        Ok(())
    }

    /// 在 `i` 处插入（`i == len` 等价于 push）
    pub fn insert(&mut self, i: Int, elem: impl IntoIterator<Item = Value>) -> Result<(), VmError> {
        let at = match usize::try_from(i) {
            Ok(at) if at <= self.len => at,
            _ => return Err(self.out_of_range(i)),
        };
        self.grow_for(1)?;
        let before = self.buf.len();
        let w = self.width;
        self.buf.splice(at * w..at * w, elem);
        self.assert_width(self.buf.len() - before);
        self.len += 1;
        Ok(())
    }

    /// 移除 `[i, i + count)`，被移除的值交给调用方
    pub fn remove(&mut self, i: Int, count: Int) -> Result<Vec<Value>, VmError> {
        let (start, count) = self.check_range(i, count)?;
        let w = self.width;
        let removed = self.buf.drain(start * w..(start + count) * w).collect();
        self.len -= count;
        Ok(removed)
    }

    /// 从另一个向量复制 `[start, start + count)`（引用元素计数 +1）
    ///
    /// 源和目标是同一个对象时，先取出 `slice(..).to_vec()` 再调用
    /// [`VectorObj::append_values`]。
    pub fn append(&mut self, other: &VectorObj, start: Int, count: Int) -> Result<(), VmError> {
        assert_eq!(self.width, other.width, "append between vectors of different width");
        let (s, c) = other.check_range(start, count)?;
        let w = self.width;
        self.grow_for(c)?;
        self.buf.extend(other.buf[s * w..(s + c) * w].iter().cloned());
        self.len += c;
        Ok(())
    }

    /// 追加 `count` 个展平元素（所有权转入）
    pub fn append_values(&mut self, values: Vec<Value>, count: usize) -> Result<(), VmError> {
        assert_eq!(values.len(), count * self.width, "vector element width mismatch");
        self.grow_for(count)?;
        self.buf.extend(values);
        self.len += count;
        Ok(())
    }

    /// 重设容量；缩小到 `len` 以下时丢弃（并释放）尾部元素
    pub fn resize(&mut self, new_cap: Int) -> Result<(), VmError> {
        let new_cap = usize::try_from(new_cap).map_err(|_| self.out_of_range(new_cap))?;
        if new_cap < self.len {
            self.buf.truncate(new_cap * self.width);
            self.len = new_cap;
        }
        self.set_capacity(new_cap)
    }

    // ==================== 内部 ====================

    #[inline]
    fn elem(&self, i: usize) -> &[Value] {
        &self.buf[i * self.width..(i + 1) * self.width]
    }

    fn check_index(&self, i: Int) -> Result<usize, VmError> {
        match usize::try_from(i) {
            Ok(at) if at < self.len => Ok(at),
            _ => Err(self.out_of_range(i)),
        }
    }

    fn check_range(&self, start: Int, count: Int) -> Result<(usize, usize), VmError> {
        let s = usize::try_from(start).map_err(|_| self.out_of_range(start))?;
        let c = usize::try_from(count).map_err(|_| self.out_of_range(count))?;
        if s > self.len || c > self.len - s {
            return Err(self.out_of_range(start.saturating_add(count)));
        }
        Ok((s, c))
    }

    fn out_of_range(&self, index: Int) -> VmError {
        VmError::IndexOutOfRange {
            index: index as i64,
            len: self.len,
        }
    }

    #[track_caller]
    fn assert_width(&self, got: usize) {
        assert_eq!(got, self.width, "vector element width mismatch");
    }

    fn grow_for(&mut self, extra: usize) -> Result<(), VmError> {
        let needed = self.len.checked_add(extra).ok_or(VmError::OutOfMemory {
            requested: usize::MAX,
        })?;
        if needed <= self.cap {
            return Ok(());
        }
        let new_cap = self.cap.saturating_mul(2).max(MIN_CAPACITY).max(needed);
        self.set_capacity(new_cap)
    }

    /// 调整底层缓冲区，调用前保证 `new_cap >= len`
    fn set_capacity(&mut self, new_cap: usize) -> Result<(), VmError> {
        let slots = new_cap
            .checked_mul(self.width)
            .ok_or(VmError::OutOfMemory { requested: usize::MAX })?;
        if slots > self.buf.capacity() {
            self.buf
                .try_reserve_exact(slots - self.buf.len())
                .map_err(|_| VmError::OutOfMemory { requested: slots })?;
        } else {
            self.buf.shrink_to(slots);
        }
        self.cap = new_cap;
        Ok(())
    }
}

impl Drop for VectorObj {
    fn drop(&mut self) {
        self.len = 0;
        if self.holds_refs {
            heap::release(mem::take(&mut self.buf));
        }
    }
}
