//! 协程引擎：创建、恢复、挂起、结束
//!
//! 恢复时把私有缓冲区的值 *移动* 回共享栈顶部，帧基址加上新的起点；
//! 挂起时把 `[起点, 栈顶)` 和 Resume 之后压入的帧移动回私有缓冲区，
//! 帧基址减去起点。只有跨越共享/私有边界的值被移动，计数不变。

use super::{Frame, Vm};
use crate::bytecode::FuncIdx;
use crate::error::VmError;
use crate::object::{CoState, CoroutineObj, ObjRef, ResumeLink, SavedState};
use crate::types::TypeIdx;
use crate::value::{InsPtr, Value};
use krill_config::Phase;
use krill_log::debug;

/// `CoNew`：弹出参数，局部变量补 nil
pub(super) fn create(vm: &mut Vm, func: FuncIdx, ty: TypeIdx) -> Result<(), VmError> {
    let info = vm.program.function(func);
    let (nargs, nlocals, entry) = (info.nargs as usize, info.nlocals as usize, info.entry);
    let mut locals = vm.pop_n(nargs);
    locals.resize(nlocals, Value::Nil);
    let co = ObjRef::new_coroutine(ty, CoroutineObj::new(func, entry, locals));
    debug!(
        vm.logger,
        target: Phase::Coroutine.target(),
        "created {:?} for `{}`",
        co,
        vm.program.function(func).name
    );
    vm.push(Value::obj(co))
}

/// `CoResume`：`[co, value]`
pub(super) fn resume(vm: &mut Vm) -> Result<(), VmError> {
    let value = vm.pop();
    let co = vm.pop_obj();
    let link = ResumeLink {
        return_ip: InsPtr(vm.ip as u32),
        stack_start: vm.stack.len(),
        frame_start: vm.frames.len(),
    };
    let (prev, saved) = co.coroutine_mut().begin_resume(link)?;
    // 先入链：后续任何错误都会在展开时把它标记为 Done
    vm.active.push(co.clone());

    let extra = saved.stack.len() + usize::from(prev == CoState::Suspended);
    vm.reserve_slots(extra)?;
    if vm.frames.len() + saved.frames.len() > vm.limits.max_call_depth {
        return Err(VmError::StackOverflow {
            limit: vm.limits.max_call_depth,
        });
    }

    vm.frames.extend(
        saved
            .frames
            .iter()
            .map(|f| f.rebased(f.base + link.stack_start)),
    );
    vm.stack.extend(saved.stack);
    match prev {
        // 首次恢复的值没有接收者
        CoState::Fresh => drop(value),
        _ => vm.stack.push(value),
    }
    vm.ip = saved.resume_ip.index();

    debug!(
        vm.logger,
        target: Phase::Coroutine.target(),
        "resume {:?} from {:?} (depth {})",
        co,
        prev,
        vm.active.len()
    );
    Ok(())
}

/// `Yield`：把协程区间搬回私有缓冲区，值交给父执行
pub(super) fn yield_value(vm: &mut Vm) -> Result<(), VmError> {
    let value = vm.pop();
    let co = vm.active.pop().ok_or(VmError::YieldOutsideCoroutine)?;
    let link = match co.coroutine().link() {
        Some(link) => link,
        None => panic!("active coroutine without a parent link"),
    };

    let stack = vm.stack.split_off(link.stack_start);
    let frames: Vec<Frame> = vm
        .frames
        .drain(link.frame_start..)
        .map(|f| f.rebased(f.base - link.stack_start))
        .collect();
    co.coroutine_mut().suspend(SavedState {
        stack,
        frames,
        resume_ip: InsPtr(vm.ip as u32),
    });
    vm.ip = link.return_ip.index();

    debug!(
        vm.logger,
        target: Phase::Coroutine.target(),
        "yield from {:?}",
        co
    );
    // 父执行已不再引用它时，这里走 abandoned 路径
    drop(co);
    vm.push(value)
}

/// 协程入口帧返回：Running → Done，结果交给父执行
pub(super) fn finish(vm: &mut Vm, results: Vec<Value>) -> Result<(), VmError> {
    let co = match vm.active.pop() {
        Some(co) => co,
        None => panic!("coroutine return without an active coroutine"),
    };
    let link = co.coroutine_mut().finish();
    debug_assert_eq!(vm.stack.len(), link.stack_start);
    debug_assert_eq!(vm.frames.len(), link.frame_start);
    vm.ip = link.return_ip.index();

    debug!(vm.logger, target: Phase::Coroutine.target(), "finished {:?}", co);
    vm.push_all(results)
}

/// `CoDone`
pub(super) fn is_done(vm: &mut Vm) -> Result<(), VmError> {
    let co = vm.pop_obj();
    let done = co.coroutine().is_done();
    vm.push(Value::bool(done))
}

/// `CoLocal(slot)`：读取挂起协程的局部变量
pub(super) fn local(vm: &mut Vm, slot: u16) -> Result<(), VmError> {
    let co = vm.pop_obj();
    let v = co.coroutine().local(slot as usize)?.clone();
    vm.push(v)
}
