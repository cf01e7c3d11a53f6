//! 堆计数器
//!
//! 每个线程一份的分配/释放统计。对象构造时记一次分配，最后一次
//! decrement 时记一次释放，测试用它断言引用计数平衡（无泄漏、无重复释放）。
//! VM 关闭时也用它做泄漏报告。
//!
//! 对象释放时持有的子值不在当前调用里递归丢弃，而是交给线程内的待释放
//! 队列（见 [`release`]），由最外层的释放调用逐个处理。

use crate::object::ObjKind;
use crate::value::Value;
use std::cell::{Cell, RefCell};

/// 分配统计快照
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// 累计分配的对象数
    pub allocated: u64,
    /// 累计释放的对象数
    pub freed: u64,
    /// 以挂起状态被丢弃、走了 unwind 路径的协程数
    pub abandoned_coroutines: u64,
    live_by_kind: [u64; ObjKind::COUNT],
}

impl HeapStats {
    /// 当前存活对象数
    pub fn live(&self) -> u64 {
        self.allocated - self.freed
    }

    /// 某一种对象的存活数
    pub fn live_of(&self, kind: ObjKind) -> u64 {
        self.live_by_kind[kind as usize]
    }
}

thread_local! {
    static STATS: RefCell<HeapStats> = RefCell::new(HeapStats::default());
}

/// 当前线程的统计快照
pub fn stats() -> HeapStats {
    STATS.with(|s| s.borrow().clone())
}

/// 当前线程存活对象数
pub fn live() -> u64 {
    STATS.with(|s| s.borrow().live())
}

pub(crate) fn record_alloc(kind: ObjKind) {
    STATS.with(|s| {
        let mut s = s.borrow_mut();
        s.allocated += 1;
        s.live_by_kind[kind as usize] += 1;
    });
}

pub(crate) fn record_free(kind: ObjKind) {
    STATS.with(|s| {
        let mut s = s.borrow_mut();
        assert!(
            s.live_by_kind[kind as usize] > 0,
            "double free of {kind:?} object"
        );
        s.freed += 1;
        s.live_by_kind[kind as usize] -= 1;
    });
}

pub(crate) fn record_abandoned() {
    STATS.with(|s| s.borrow_mut().abandoned_coroutines += 1);
}

// ==================== 待释放队列 ====================

struct ReleaseQueue {
    pending: RefCell<Vec<Value>>,
    draining: Cell<bool>,
}

thread_local! {
    static RELEASE: ReleaseQueue = const {
        ReleaseQueue {
            pending: RefCell::new(Vec::new()),
            draining: Cell::new(false),
        }
    };
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// 丢弃一个正在释放的对象所持有的值
///
/// 子对象的最后一次 decrement 会再次进入这里；嵌套调用只入队，由最外层
/// 调用循环清空队列，原生栈深度与对象链长度无关。
pub(crate) fn release(mut values: Vec<Value>) {
    values.retain(Value::is_ref);
    if values.is_empty() {
        return;
    }
    // 线程退出、队列已销毁时 values 留在本地，按普通方式丢弃
    let _ = RELEASE.try_with(|q| {
        q.pending.borrow_mut().append(&mut values);
        if q.draining.replace(true) {
            return;
        }
        let _guard = DrainGuard(&q.draining);
        loop {
            let next = q.pending.borrow_mut().pop();
            match next {
                Some(v) => drop(v),
                None => break,
            }
        }
    });
}
