//! 函数调用、返回与原生函数调用

use super::{coroutine, Frame, Vm};
use crate::bytecode::{FuncIdx, NativeIdx};
use crate::error::VmError;
use crate::native::{self, NativeCtx};
use crate::value::{InsPtr, Value};
use std::rc::Rc;

/// 压入入口函数的帧
pub(super) fn enter_main(vm: &mut Vm, main: FuncIdx) -> Result<(), VmError> {
    let info = vm.program.function(main);
    let (nlocals, entry) = (info.nlocals as usize, info.entry);
    vm.reserve_slots(nlocals)?;
    vm.stack.resize(nlocals, Value::Nil);
    vm.frames.push(Frame {
        func: main,
        return_ip: InsPtr::END,
        base: 0,
    });
    vm.ip = entry.index();
    Ok(())
}

/// 调用函数：参数已在栈顶
pub(super) fn call_function(vm: &mut Vm, f: FuncIdx) -> Result<(), VmError> {
    if vm.frames.len() >= vm.limits.max_call_depth {
        return Err(VmError::StackOverflow {
            limit: vm.limits.max_call_depth,
        });
    }
    let info = vm.program.function(f);
    let (nargs, nlocals, entry) = (info.nargs as usize, info.nlocals as usize, info.entry);

    let base = match vm.stack.len().checked_sub(nargs) {
        Some(base) if base >= vm.frame().base => base,
        _ => panic!("call to `{}` without its {nargs} argument(s)", info.name),
    };
    vm.reserve_slots(nlocals - nargs)?;
    vm.stack.resize(base + nlocals, Value::Nil);
    vm.frames.push(Frame {
        func: f,
        return_ip: InsPtr(vm.ip as u32),
        base,
    });
    vm.ip = entry.index();
    Ok(())
}

/// 间接调用：`[args.., fn]`
pub(super) fn call_dyn(vm: &mut Vm) -> Result<(), VmError> {
    let ip = vm.pop().ipval();
    let f = match vm.entries.get(&ip) {
        Some(f) => *f,
        None => panic!("function value {} is not a function entry", ip.0),
    };
    call_function(vm, f)
}

/// 返回栈顶 `n` 个值
///
/// 主函数返回时得到 `Some(结果)`；协程入口帧返回时转入协程结束流程。
pub(super) fn ret(vm: &mut Vm, n: u16) -> Result<Option<Vec<Value>>, VmError> {
    let results = vm.pop_n(n as usize);
    let frame = match vm.frames.pop() {
        Some(frame) => frame,
        None => panic!("return without a call frame"),
    };
    vm.stack.truncate(frame.base);

    if frame.return_ip == InsPtr::END {
        if vm.active.is_empty() {
            return Ok(Some(results));
        }
        coroutine::finish(vm, results)?;
        return Ok(None);
    }

    vm.push_all(results)?;
    vm.ip = frame.return_ip.index();
    Ok(None)
}

/// 调用原生函数：校验参数窗口 → 调用 → 校验返回槽位数
pub(super) fn call_native(vm: &mut Vm, idx: NativeIdx) -> Result<(), VmError> {
    let program = Rc::clone(&vm.program);
    let sig = &program.natives[idx.index()];
    let f = vm.natives[idx.index()];

    // 不越过当前帧的局部变量
    let floor = vm.frame().base + program.function(vm.frame().func).nlocals as usize;
    let available = vm.stack.len().saturating_sub(floor);
    let width = program.types.total_width(&sig.args);
    let args = vm.pop_n(width.min(available));
    native::check_args(&program.types, sig, &args)?;

    let ret = {
        let mut ctx = NativeCtx {
            types: &program.types,
            logger: &vm.logger,
            output: &mut vm.output,
        };
        f(&mut ctx, args)?
    };
    let values = ret.into_values();
    native::check_rets(&program.types, sig, &values)?;
    vm.push_all(values)
}
