//! 调用帧

use crate::bytecode::FuncIdx;
use crate::value::InsPtr;

/// 调用帧
///
/// 局部变量从 `base` 开始；临时值位于局部变量之上。返回时把栈截断到
/// `base`，局部变量和残留的临时值一起被释放。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    pub func: FuncIdx,
    /// 主函数与协程入口帧为 [`InsPtr::END`]
    pub return_ip: InsPtr,
    pub base: usize,
}

impl Frame {
    /// 换一个基址（协程恢复/挂起时平移帧）
    #[inline]
    pub fn rebased(self, base: usize) -> Frame {
        Frame { base, ..self }
    }
}
