//! 栈操作
//!
//! 下溢说明字节码的栈效果不平衡，属于程序错误，直接 panic；
//! 上溢是可报告的资源耗尽。

use super::{Frame, Vm};
use crate::error::VmError;
use crate::object::ObjRef;
use crate::value::{Float, Int, Value};

impl Vm {
    #[inline]
    pub(crate) fn push(&mut self, v: Value) -> Result<(), VmError> {
        if self.stack.len() >= self.limits.max_stack_size {
            return Err(self.stack_overflow());
        }
        self.stack.push(v);
        Ok(())
    }

    pub(crate) fn push_all(&mut self, vals: Vec<Value>) -> Result<(), VmError> {
        self.reserve_slots(vals.len())?;
        self.stack.extend(vals);
        Ok(())
    }

    /// 确保还能再压入 `n` 个槽位
    pub(crate) fn reserve_slots(&self, n: usize) -> Result<(), VmError> {
        if self.stack.len() + n > self.limits.max_stack_size {
            return Err(self.stack_overflow());
        }
        Ok(())
    }

    fn stack_overflow(&self) -> VmError {
        VmError::StackOverflow {
            limit: self.limits.max_stack_size,
        }
    }

    #[inline]
    #[track_caller]
    pub(crate) fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(v) => v,
            None => underflow(),
        }
    }

    /// 弹出栈顶 `n` 个值（保持原顺序）
    #[track_caller]
    pub(crate) fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let len = self.stack.len();
        if n > len {
            underflow();
        }
        self.stack.split_off(len - n)
    }

    #[inline]
    #[track_caller]
    pub(crate) fn pop_int(&mut self) -> Int {
        self.pop().ival()
    }

    #[inline]
    #[track_caller]
    pub(crate) fn pop_float(&mut self) -> Float {
        self.pop().fval()
    }

    #[inline]
    #[track_caller]
    pub(crate) fn pop_obj(&mut self) -> ObjRef {
        self.pop().into_obj()
    }

    #[inline]
    #[track_caller]
    pub(crate) fn peek(&self, distance: usize) -> &Value {
        let len = self.stack.len();
        if distance >= len {
            underflow();
        }
        &self.stack[len - 1 - distance]
    }

    #[inline]
    #[track_caller]
    pub(crate) fn frame(&self) -> &Frame {
        match self.frames.last() {
            Some(frame) => frame,
            None => panic!("no active call frame"),
        }
    }

    /// 当前帧局部变量的绝对下标
    #[inline]
    #[track_caller]
    pub(crate) fn local_index(&self, slot: u16) -> usize {
        let idx = self.frame().base + slot as usize;
        if idx >= self.stack.len() {
            panic!("local slot {slot} outside the current frame");
        }
        idx
    }
}

#[cold]
#[track_caller]
fn underflow() -> ! {
    panic!("stack underflow")
}
