//! 测试辅助工具
//!
//! 手写字节码的小型汇编辅助与运行辅助

#![allow(dead_code)]

use krill_core::heap::{self, HeapStats};
use krill_core::{
    Int, LimitConfig, Op, Program, ProgramBuilder, RunError, TypeTable, TypeTableBuilder, Value,
    Vm, VmOptions,
};

/// 只含内置类型的类型表
pub fn builtin_types() -> TypeTable {
    TypeTableBuilder::new().build().unwrap()
}

/// 由单个入口函数组成的程序
pub fn main_only(types: TypeTable, nlocals: u16, ops: &[Op]) -> Program {
    let mut b = ProgramBuilder::new(types);
    let main = b.function("main", 0, nlocals);
    b.begin(main);
    emit_lines(&mut b, ops);
    b.finish().unwrap()
}

/// 每条指令占一行（行号从 1 开始）
pub fn emit_lines(b: &mut ProgramBuilder, ops: &[Op]) {
    for op in ops {
        let line = b.here().0 + 1;
        b.emit(*op, line);
    }
}

/// 使用默认选项执行
pub fn run(program: Program) -> Result<Vec<Value>, RunError> {
    let mut vm = Vm::new(program).unwrap();
    vm.run()
}

/// 执行并返回 Print 的输出
pub fn run_with_output(program: Program) -> (Result<Vec<Value>, RunError>, Vec<String>) {
    let mut vm = Vm::new(program).unwrap();
    let result = vm.run();
    (result, vm.take_output())
}

/// 使用给定的限制执行
pub fn run_limited(program: Program, limits: LimitConfig) -> Result<Vec<Value>, RunError> {
    let options = VmOptions {
        limits,
        ..VmOptions::default()
    };
    let mut vm = Vm::with_options(program, options).unwrap();
    vm.run()
}

/// 返回值全部按整数读取
pub fn ints(values: &[Value]) -> Vec<Int> {
    values.iter().map(Value::ival).collect()
}

/// 单个整数返回值
pub fn get_int(values: &[Value]) -> Int {
    assert_eq!(values.len(), 1, "expected exactly one return value");
    values[0].ival()
}

/// 单个字符串返回值
pub fn get_string(values: &[Value]) -> String {
    assert_eq!(values.len(), 1, "expected exactly one return value");
    values[0].as_obj().as_str().to_string()
}

/// 两个快照之间分配与释放的次数是否相等
pub fn assert_balanced(before: &HeapStats) {
    let after = heap::stats();
    assert_eq!(
        after.allocated - before.allocated,
        after.freed - before.freed,
        "unbalanced heap: {before:?} -> {after:?}"
    );
}
