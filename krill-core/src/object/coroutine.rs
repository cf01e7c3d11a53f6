//! 协程对象
//!
//! 协程是一份"保存的执行状态"：挂起时把共享栈上属于它的区间（从协程起点
//! 到栈顶）和 Resume 之后压入的帧一起搬进私有缓冲区；恢复时再搬回共享栈
//! 顶部，并按新旧起点的差值修正帧基址。挂起中的协程不持有任何指向共享栈的
//! 引用。
//!
//! 状态机：Fresh → Running ⇄ Suspended → Done。挂起状态下最后一个引用被
//! 丢弃时走 abandoned 路径：按帧从内到外释放捕获的值。

use crate::bytecode::FuncIdx;
use crate::error::VmError;
use crate::heap;
use crate::value::{InsPtr, Value};
use crate::vm::Frame;
use std::mem;

/// 协程状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoState {
    /// 已创建，尚未开始执行
    Fresh,
    /// 正在执行（位于 VM 的活动协程链上）
    Running,
    /// 在 yield 处挂起
    Suspended,
    /// 已返回或已被错误展开
    Done,
}

/// 私有缓冲区
///
/// 帧基址相对于协程起点（0 即协程入口帧的基址）。
#[derive(Debug)]
pub struct SavedState {
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub resume_ip: InsPtr,
}

impl Default for SavedState {
    fn default() -> Self {
        Self {
            stack: Vec::new(),
            frames: Vec::new(),
            resume_ip: InsPtr::END,
        }
    }
}

/// 父执行的链接：恢复点与协程在共享栈上的起点
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResumeLink {
    /// yield / 返回后父执行继续的位置
    pub return_ip: InsPtr,
    /// 协程区间在共享栈上的起点
    pub stack_start: usize,
    /// 协程的第一帧在帧栈上的位置
    pub frame_start: usize,
}

#[derive(Debug)]
pub struct CoroutineObj {
    func: FuncIdx,
    state: CoState,
    saved: SavedState,
    link: Option<ResumeLink>,
    resumes: u32,
}

impl CoroutineObj {
    /// 以参数 + 局部变量（已填零值）创建，入口帧基址为 0
    pub fn new(func: FuncIdx, entry: InsPtr, locals: Vec<Value>) -> Self {
        Self {
            func,
            state: CoState::Fresh,
            saved: SavedState {
                stack: locals,
                frames: vec![Frame {
                    func,
                    return_ip: InsPtr::END,
                    base: 0,
                }],
                resume_ip: entry,
            },
            link: None,
            resumes: 0,
        }
    }

    #[inline]
    pub fn func(&self) -> FuncIdx {
        self.func
    }

    #[inline]
    pub fn state(&self) -> CoState {
        self.state
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state == CoState::Done
    }

    #[inline]
    pub fn link(&self) -> Option<ResumeLink> {
        self.link
    }

    /// 已恢复的次数
    #[inline]
    pub fn resumes(&self) -> u32 {
        self.resumes
    }

    #[inline]
    pub fn saved(&self) -> &SavedState {
        &self.saved
    }

    /// 读取协程入口帧的局部变量
    ///
    /// 运行中数据位于共享栈上，不可访问；结束后数据已释放。
    pub fn local(&self, slot: usize) -> Result<&Value, VmError> {
        match self.state {
            CoState::Running => Err(VmError::CoroutineRunning),
            CoState::Done => Err(VmError::CoroutineState(CoState::Done)),
            CoState::Fresh | CoState::Suspended => {
                self.saved
                    .stack
                    .get(slot)
                    .ok_or(VmError::IndexOutOfRange {
                        index: slot as i64,
                        len: self.saved.stack.len(),
                    })
            }
        }
    }

    // ==================== 状态迁移（由 VM 驱动）====================

    /// Fresh/Suspended → Running，取出私有缓冲区
    pub(crate) fn begin_resume(
        &mut self,
        link: ResumeLink,
    ) -> Result<(CoState, SavedState), VmError> {
        match self.state {
            CoState::Fresh | CoState::Suspended => {
                let prev = self.state;
                self.state = CoState::Running;
                self.link = Some(link);
                self.resumes += 1;
                Ok((prev, mem::take(&mut self.saved)))
            }
            other => Err(VmError::CoroutineState(other)),
        }
    }

    /// Running → Suspended，存入私有缓冲区，返回父链接
    #[track_caller]
    pub(crate) fn suspend(&mut self, saved: SavedState) -> ResumeLink {
        assert_eq!(self.state, CoState::Running, "yield from a coroutine that is not running");
        self.saved = saved;
        self.state = CoState::Suspended;
        self.take_link()
    }

    /// Running → Done（正常返回），返回父链接
    #[track_caller]
    pub(crate) fn finish(&mut self) -> ResumeLink {
        assert_eq!(self.state, CoState::Running, "return from a coroutine that is not running");
        self.state = CoState::Done;
        self.take_link()
    }

    /// 错误展开：直接标记为 Done
    pub(crate) fn kill(&mut self) {
        self.state = CoState::Done;
        self.link = None;
        self.unwind();
    }

    #[track_caller]
    fn take_link(&mut self) -> ResumeLink {
        match self.link.take() {
            Some(link) => link,
            None => panic!("running coroutine without a parent link"),
        }
    }

    /// 从最内层帧开始逐帧释放私有缓冲区中的值
    fn unwind(&mut self) {
        while let Some(frame) = self.saved.frames.pop() {
            let base = frame.base.min(self.saved.stack.len());
            heap::release(self.saved.stack.split_off(base));
        }
        heap::release(mem::take(&mut self.saved.stack));
    }
}

impl Drop for CoroutineObj {
    fn drop(&mut self) {
        if self.state == CoState::Suspended {
            heap::record_abandoned();
        }
        self.unwind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjRef;
    use crate::types::TypeIdx;

    fn link() -> ResumeLink {
        ResumeLink {
            return_ip: InsPtr(3),
            stack_start: 10,
            frame_start: 1,
        }
    }

    #[test]
    fn test_state_machine() {
        let mut co = CoroutineObj::new(FuncIdx(1), InsPtr(20), vec![Value::int(4)]);
        assert_eq!(co.state(), CoState::Fresh);
        assert_eq!(co.local(0).unwrap(), &Value::int(4));

        let (prev, saved) = co.begin_resume(link()).unwrap();
        assert_eq!(prev, CoState::Fresh);
        assert_eq!(saved.resume_ip, InsPtr(20));
        assert_eq!(saved.frames.len(), 1);
        assert!(matches!(co.local(0), Err(VmError::CoroutineRunning)));
        assert!(matches!(
            co.begin_resume(link()),
            Err(VmError::CoroutineState(CoState::Running))
        ));

        let back = co.suspend(saved);
        assert_eq!(back, link());
        assert_eq!(co.state(), CoState::Suspended);

        let (prev, _saved) = co.begin_resume(link()).unwrap();
        assert_eq!(prev, CoState::Suspended);
        co.finish();
        assert!(co.is_done());
        assert!(matches!(
            co.begin_resume(link()),
            Err(VmError::CoroutineState(CoState::Done))
        ));
        assert_eq!(co.resumes(), 2);
    }

    #[test]
    fn test_abandoned_releases_captures() {
        let captured = Value::obj(ObjRef::new_string(TypeIdx::STRING, "captured"));
        let mut co = CoroutineObj::new(FuncIdx(0), InsPtr(0), vec![captured.clone()]);
        let (_, mut saved) = co.begin_resume(link()).unwrap();
        // 模拟嵌套调用后挂起
        saved.stack.push(captured.clone());
        saved.frames.push(Frame {
            func: FuncIdx(2),
            return_ip: InsPtr(5),
            base: 1,
        });
        co.suspend(saved);
        assert_eq!(captured.refc(), Some(3));

        let abandoned = heap::stats().abandoned_coroutines;
        drop(co);
        assert_eq!(captured.refc(), Some(1));
        assert_eq!(heap::stats().abandoned_coroutines, abandoned + 1);
    }
}
