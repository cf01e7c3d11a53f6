//! 主执行循环

use super::{arith, call, collections, coroutine, Vm};
use crate::bytecode::Op;
use crate::error::VmError;
use crate::generic;
use crate::value::{Int, Value};
use krill_config::Phase;
use krill_log::debug;
use std::rc::Rc;

/// 执行字节码直到入口函数返回或遇到 `Halt`
pub(super) fn run(vm: &mut Vm) -> Result<Vec<Value>, VmError> {
    let program = Rc::clone(&vm.program);

    loop {
        #[cfg(feature = "trace_execution")]
        trace_instruction(vm);

        let op = match program.code.get(vm.ip) {
            Some(op) => *op,
            None => panic!("instruction pointer {} ran off the end of the code", vm.ip),
        };
        vm.ip += 1;

        match op {
            // ===== 栈与局部变量 =====
            Op::PushInt(n) => vm.push(Value::int(n))?,
            Op::PushFloat(f) => vm.push(Value::float(f))?,
            Op::PushNil => vm.push(Value::Nil)?,
            Op::PushStr(s) => {
                let s = vm.strings[s.index()].clone();
                vm.push(Value::obj(s))?;
            }
            Op::PushFun(f) => {
                let entry = program.function(f).entry;
                vm.push(Value::ip(entry))?;
            }
            Op::Pop => drop(vm.pop()),
            Op::Dup => {
                let v = vm.peek(0).clone();
                vm.push(v)?;
            }
            Op::LoadLocal(slot) => {
                let v = vm.stack[vm.local_index(slot)].clone();
                vm.push(v)?;
            }
            Op::StoreLocal(slot) => {
                let v = vm.pop();
                let idx = vm.local_index(slot);
                vm.stack[idx] = v;
            }

            // ===== 算术 =====
            Op::IAdd
            | Op::ISub
            | Op::IMul
            | Op::IDiv
            | Op::IMod
            | Op::ILt
            | Op::ILe
            | Op::IGt
            | Op::IGe
            | Op::IEq
            | Op::INe => arith::int_binary(vm, op)?,
            Op::INeg => arith::int_neg(vm)?,
            Op::FAdd
            | Op::FSub
            | Op::FMul
            | Op::FDiv
            | Op::FLt
            | Op::FLe
            | Op::FGt
            | Op::FGe
            | Op::FEq
            | Op::FNe => arith::float_binary(vm, op)?,
            Op::FNeg => arith::float_neg(vm)?,
            Op::I2F => arith::int_to_float(vm)?,
            Op::F2I => arith::float_to_int(vm)?,
            Op::Not => arith::not(vm)?,
            Op::IVAdd(w) => arith::int_vec_add(vm, w)?,
            Op::FVAdd(w) => arith::float_vec_add(vm, w)?,
            Op::IVScale(w) => arith::int_vec_scale(vm, w)?,
            Op::FVScale(w) => arith::float_vec_scale(vm, w)?,

            // ===== 控制流 =====
            Op::Jump(target) => vm.ip = target.index(),
            Op::JumpIfFalse(target) => {
                if !vm.pop().truthy() {
                    vm.ip = target.index();
                }
            }
            Op::Call(f) => call::call_function(vm, f)?,
            Op::CallDyn => call::call_dyn(vm)?,
            Op::CallNative(n) => call::call_native(vm, n)?,
            Op::Return(n) => {
                if let Some(results) = call::ret(vm, n)? {
                    return Ok(results);
                }
            }
            Op::Assert(msg) => {
                if !vm.pop().truthy() {
                    return Err(VmError::AssertionFailed(program.strings[msg.index()].clone()));
                }
            }
            Op::Halt => {
                let top = vm.stack.pop();
                vm.unwind();
                return Ok(top.into_iter().collect());
            }

            // ===== 字符串 =====
            Op::SConcat => collections::concat(vm)?,
            Op::SLen => collections::str_len(vm)?,
            Op::SEq => collections::str_eq(vm)?,

            // ===== 向量 =====
            Op::NewVec { ty, n } => collections::new_vector(vm, ty, n)?,
            Op::VecPush => collections::push(vm)?,
            Op::VecPop => collections::pop(vm)?,
            Op::VecTop => collections::top(vm)?,
            Op::VecInsert => collections::insert(vm)?,
            Op::VecRemove { count } => collections::remove(vm, count)?,
            Op::VecAt => collections::at(vm)?,
            Op::VecSet => collections::set(vm)?,
            Op::VecLen => collections::len(vm)?,
            Op::VecCap => collections::capacity(vm)?,
            Op::VecAppend => collections::append(vm)?,
            Op::VecResize => collections::resize(vm)?,

            // ===== 结构体 =====
            Op::NewStruct(ty) => collections::new_struct(vm, ty)?,
            Op::StructAt { ty, field } => collections::field(vm, ty, field)?,
            Op::StructReplace { ty, field } => collections::replace(vm, ty, field)?,
            Op::InlineField {
                width,
                offset,
                count,
            } => collections::inline_field(vm, width, offset, count)?,

            // ===== 装箱 =====
            Op::BoxInt => collections::box_int(vm)?,
            Op::BoxFloat => collections::box_float(vm)?,
            Op::UnboxInt => collections::unbox_int(vm)?,
            Op::UnboxFloat => collections::unbox_float(vm)?,

            // ===== 泛型 =====
            Op::Eq { ty, deep } => {
                let w = program.types.width(ty);
                let b = vm.pop_n(w);
                let a = vm.pop_n(w);
                let eq = generic::equals(&program.types, ty, &a, &b, deep);
                vm.push(Value::bool(eq))?;
            }
            Op::Hash(ty) => {
                let v = vm.pop_n(program.types.width(ty));
                let h = generic::hash(&program.types, ty, &v);
                vm.push(Value::int(h as Int))?;
            }
            Op::ToStr(ty) => {
                let v = vm.pop_n(program.types.width(ty));
                let text = generic::format(&program.types, ty, &v);
                let s = vm.alloc_string(&text);
                vm.push(s)?;
            }
            Op::Print(ty) => {
                let v = vm.pop_n(program.types.width(ty));
                let text = generic::format(&program.types, ty, &v);
                debug!(vm.logger, target: Phase::Vm.target(), "print: {}", text);
                vm.output.push(text);
            }

            // ===== 协程 =====
            Op::CoNew { func, ty } => coroutine::create(vm, func, ty)?,
            Op::CoResume => coroutine::resume(vm)?,
            Op::Yield => coroutine::yield_value(vm)?,
            Op::CoDone => coroutine::is_done(vm)?,
            Op::CoLocal(slot) => coroutine::local(vm, slot)?,
        }
    }
}

/// 逐指令追踪
#[cfg(feature = "trace_execution")]
fn trace_instruction(vm: &Vm) {
    use krill_log::trace;

    if !vm.config.trace_execution {
        return;
    }
    let Some(op) = vm.program.code.get(vm.ip) else {
        return;
    };
    let top: Vec<_> = vm.stack.iter().rev().take(4).collect();
    trace!(
        vm.logger,
        target: Phase::Vm.target(),
        "{:04} {:<14} depth={} co={} top={:?}",
        vm.ip,
        op.name(),
        vm.frames.len(),
        vm.active.len(),
        top
    );
}
