//! 算术与比较运算
//!
//! 按静态操作数类型特化，没有隐式转换。整数运算按补码回绕，
//! 浮点运算遵循 IEEE 754。比较结果为整数 0/1。

use super::Vm;
use crate::bytecode::Op;
use crate::error::VmError;
use crate::value::{Float, Int, Value};

/// 整数二元运算：`[a, b]`
pub(super) fn int_binary(vm: &mut Vm, op: Op) -> Result<(), VmError> {
    let b = vm.pop_int();
    let a = vm.pop_int();
    let result = match op {
        Op::IAdd => Value::int(a.wrapping_add(b)),
        Op::ISub => Value::int(a.wrapping_sub(b)),
        Op::IMul => Value::int(a.wrapping_mul(b)),
        Op::IDiv => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            Value::int(a.wrapping_div(b))
        }
        Op::IMod => {
            if b == 0 {
                return Err(VmError::DivisionByZero);
            }
            Value::int(a.wrapping_rem(b))
        }
        Op::ILt => Value::bool(a < b),
        Op::ILe => Value::bool(a <= b),
        Op::IGt => Value::bool(a > b),
        Op::IGe => Value::bool(a >= b),
        Op::IEq => Value::bool(a == b),
        Op::INe => Value::bool(a != b),
        other => unreachable!("{} is not an integer binary op", other.name()),
    };
    vm.push(result)
}

/// 浮点二元运算：`[a, b]`
pub(super) fn float_binary(vm: &mut Vm, op: Op) -> Result<(), VmError> {
    let b = vm.pop_float();
    let a = vm.pop_float();
    let result = match op {
        Op::FAdd => Value::float(a + b),
        Op::FSub => Value::float(a - b),
        Op::FMul => Value::float(a * b),
        Op::FDiv => Value::float(a / b),
        Op::FLt => Value::bool(a < b),
        Op::FLe => Value::bool(a <= b),
        Op::FGt => Value::bool(a > b),
        Op::FGe => Value::bool(a >= b),
        Op::FEq => Value::bool(a == b),
        Op::FNe => Value::bool(a != b),
        other => unreachable!("{} is not a float binary op", other.name()),
    };
    vm.push(result)
}

pub(super) fn int_neg(vm: &mut Vm) -> Result<(), VmError> {
    let a = vm.pop_int();
    vm.push(Value::int(a.wrapping_neg()))
}

pub(super) fn float_neg(vm: &mut Vm) -> Result<(), VmError> {
    let a = vm.pop_float();
    vm.push(Value::float(-a))
}

pub(super) fn int_to_float(vm: &mut Vm) -> Result<(), VmError> {
    let a = vm.pop_int();
    vm.push(Value::float(a as Float))
}

/// 向零截断，越界饱和，NaN 为 0
pub(super) fn float_to_int(vm: &mut Vm) -> Result<(), VmError> {
    let a = vm.pop_float();
    vm.push(Value::int(a as Int))
}

pub(super) fn not(vm: &mut Vm) -> Result<(), VmError> {
    let v = vm.pop();
    vm.push(Value::bool(!v.truthy()))
}

// ==================== 内联结构体逐分量运算 ====================

/// `IVAdd(w)`：`[a(w), b(w)]` → `a + b`
pub(super) fn int_vec_add(vm: &mut Vm, width: u16) -> Result<(), VmError> {
    let b = vm.pop_n(width as usize);
    let a = vm.pop_n(width as usize);
    let sum = a
        .iter()
        .zip(&b)
        .map(|(x, y)| Value::int(x.ival().wrapping_add(y.ival())))
        .collect();
    vm.push_all(sum)
}

/// `FVAdd(w)`
pub(super) fn float_vec_add(vm: &mut Vm, width: u16) -> Result<(), VmError> {
    let b = vm.pop_n(width as usize);
    let a = vm.pop_n(width as usize);
    let sum = a
        .iter()
        .zip(&b)
        .map(|(x, y)| Value::float(x.fval() + y.fval()))
        .collect();
    vm.push_all(sum)
}

/// `IVScale(w)`：`[a(w), s]` → `a * s`
pub(super) fn int_vec_scale(vm: &mut Vm, width: u16) -> Result<(), VmError> {
    let s = vm.pop_int();
    let a = vm.pop_n(width as usize);
    let scaled = a
        .iter()
        .map(|x| Value::int(x.ival().wrapping_mul(s)))
        .collect();
    vm.push_all(scaled)
}

/// `FVScale(w)`
pub(super) fn float_vec_scale(vm: &mut Vm, width: u16) -> Result<(), VmError> {
    let s = vm.pop_float();
    let a = vm.pop_n(width as usize);
    let scaled = a.iter().map(|x| Value::float(x.fval() * s)).collect();
    vm.push_all(scaled)
}
