//! VM 执行测试
//!
//! 端到端测试：手写字节码并执行

mod common;
use common::{
    assert_balanced, builtin_types, emit_lines, get_int, get_string, ints, main_only, run,
    run_limited, run_with_output,
};
use krill_core::heap;
use krill_core::{
    LimitConfig, LoadError, NativeCtx, NativeRegistry, NativeRet, NativeSig, Op, ProgramBuilder,
    TypeIdx, TypeTableBuilder, Value, Vm, VmError, VmOptions,
};

// ===== 基础运算测试 =====

#[test]
fn test_integer_arithmetic() {
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(40),
            Op::PushInt(2),
            Op::IAdd,
            Op::PushInt(3),
            Op::IMul,
            Op::PushInt(7),
            Op::PushInt(2),
            Op::IDiv,
            Op::ISub,
            Op::Return(1),
        ],
    );
    assert_eq!(get_int(&run(p).unwrap()), 123);

    // 取余与负号遵循截断除法
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(-7),
            Op::PushInt(3),
            Op::IMod,
            Op::PushInt(5),
            Op::INeg,
            Op::Return(2),
        ],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![-1, -5]);
}

#[test]
fn test_integer_comparisons() {
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(1),
            Op::PushInt(2),
            Op::ILt,
            Op::PushInt(2),
            Op::PushInt(2),
            Op::IGt,
            Op::PushInt(3),
            Op::PushInt(3),
            Op::IEq,
            Op::PushNil,
            Op::Not,
            Op::Return(4),
        ],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![1, 0, 1, 1]);
}

#[test]
fn test_float_arithmetic() {
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(7),
            Op::I2F,
            Op::PushFloat(2.0),
            Op::FDiv,
            Op::PushFloat(1.5),
            Op::PushFloat(2.0),
            Op::FMul,
            Op::F2I,
            Op::PushFloat(0.5),
            Op::PushFloat(0.25),
            Op::FGe,
            Op::Return(3),
        ],
    );
    let result = run(p).unwrap();
    assert_eq!(result[0].fval(), 3.5);
    assert_eq!(result[1].ival(), 3);
    assert_eq!(result[2].ival(), 1);
}

#[test]
fn test_float_division_by_zero_is_infinite() {
    let p = main_only(
        builtin_types(),
        0,
        &[Op::PushFloat(1.0), Op::PushFloat(0.0), Op::FDiv, Op::Return(1)],
    );
    assert!(run(p).unwrap()[0].fval().is_infinite());
}

// ===== 控制流测试 =====

#[test]
fn test_loop_with_locals() {
    // i = 1; sum = 0; while i <= 10 { sum += i; i += 1 }
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 2);
    b.begin(main);
    b.emit(Op::PushInt(1), 1);
    b.op(Op::StoreLocal(0));
    b.op(Op::PushInt(0));
    b.op(Op::StoreLocal(1));
    let top = b.label();
    let end = b.label();
    b.bind(top);
    b.emit(Op::LoadLocal(0), 2);
    b.op(Op::PushInt(10));
    b.op(Op::ILe);
    b.jump_if_false(end);
    b.emit(Op::LoadLocal(1), 3);
    b.op(Op::LoadLocal(0));
    b.op(Op::IAdd);
    b.op(Op::StoreLocal(1));
    b.emit(Op::LoadLocal(0), 4);
    b.op(Op::PushInt(1));
    b.op(Op::IAdd);
    b.op(Op::StoreLocal(0));
    b.jump(top);
    b.bind(end);
    b.emit(Op::LoadLocal(1), 5);
    b.op(Op::Return(1));

    assert_eq!(get_int(&run(b.finish().unwrap()).unwrap()), 55);
}

#[test]
fn test_recursive_call() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let fib = b.function("fib", 1, 1);

    b.begin(main);
    b.emit(Op::PushInt(10), 1);
    b.op(Op::Call(fib));
    b.op(Op::Return(1));

    b.begin(fib);
    let recurse = b.label();
    b.emit(Op::LoadLocal(0), 10);
    b.op(Op::PushInt(2));
    b.op(Op::ILt);
    b.jump_if_false(recurse);
    b.op(Op::LoadLocal(0));
    b.op(Op::Return(1));
    b.bind(recurse);
    b.emit(Op::LoadLocal(0), 11);
    b.op(Op::PushInt(1));
    b.op(Op::ISub);
    b.op(Op::Call(fib));
    b.op(Op::LoadLocal(0));
    b.op(Op::PushInt(2));
    b.op(Op::ISub);
    b.op(Op::Call(fib));
    b.op(Op::IAdd);
    b.op(Op::Return(1));

    assert_eq!(get_int(&run(b.finish().unwrap()).unwrap()), 55);
}

#[test]
fn test_multiple_returns_and_dynamic_call() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let pair = b.function("pair", 0, 0);
    let double = b.function("double", 1, 1);

    b.begin(main);
    b.emit(Op::Call(pair), 1);
    b.op(Op::ISub);
    b.op(Op::PushInt(21));
    b.op(Op::PushFun(double));
    b.op(Op::CallDyn);
    b.op(Op::Return(2));

    b.begin(pair);
    b.emit(Op::PushInt(1), 5);
    b.op(Op::PushInt(2));
    b.op(Op::Return(2));

    b.begin(double);
    b.emit(Op::LoadLocal(0), 9);
    b.op(Op::PushInt(2));
    b.op(Op::IMul);
    b.op(Op::Return(1));

    assert_eq!(ints(&run(b.finish().unwrap()).unwrap()), vec![-1, 42]);
}

#[test]
fn test_return_discards_temporaries() {
    // 被调函数在返回值之下留下的临时值随帧一起释放
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let messy = b.function("messy", 0, 1);
    let s = b.string("temp");

    b.begin(main);
    b.emit(Op::PushInt(5), 1);
    b.op(Op::Call(messy));
    b.op(Op::IAdd);
    b.op(Op::Return(1));

    b.begin(messy);
    b.emit(Op::PushStr(s), 2);
    b.op(Op::PushStr(s));
    b.op(Op::SConcat);
    b.op(Op::PushInt(9));
    b.op(Op::PushInt(1));
    b.op(Op::Return(1));

    let before = heap::stats();
    assert_eq!(get_int(&run(b.finish().unwrap()).unwrap()), 6);
    assert_balanced(&before);
}

#[test]
fn test_halt_returns_top() {
    let p = main_only(
        builtin_types(),
        1,
        &[Op::PushInt(1), Op::PushInt(9), Op::Halt],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![9]);
}

// ===== 字符串与泛型操作 =====

#[test]
fn test_strings() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 1);
    let foo = b.string("foo");
    let bar = b.string("bar");
    let foobar = b.string("foobar");
    b.begin(main);
    emit_lines(
        &mut b,
        &[
            Op::PushStr(foo),
            Op::PushStr(bar),
            Op::SConcat,
            Op::StoreLocal(0),
            Op::LoadLocal(0),
            Op::SLen,
            Op::LoadLocal(0),
            Op::PushStr(foobar),
            Op::SEq,
            Op::Return(2),
        ],
    );
    assert_eq!(ints(&run(b.finish().unwrap()).unwrap()), vec![6, 1]);
}

#[test]
fn test_print_and_to_str() {
    let mut tb = TypeTableBuilder::new();
    let point = tb.structure("Point", &[TypeIdx::INT, TypeIdx::INT], true);
    let strings = tb.vector(TypeIdx::STRING);
    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 0);
    let a = b.string("a");
    let bb = b.string("b");
    b.begin(main);
    emit_lines(
        &mut b,
        &[
            Op::PushInt(1),
            Op::PushInt(2),
            Op::Print(point),
            Op::PushStr(a),
            Op::PushStr(bb),
            Op::NewVec { ty: strings, n: 2 },
            Op::Print(strings),
            Op::PushStr(a),
            Op::Print(TypeIdx::STRING),
            Op::PushFloat(2.5),
            Op::ToStr(TypeIdx::FLOAT),
            Op::Return(1),
        ],
    );

    let (result, output) = run_with_output(b.finish().unwrap());
    assert_eq!(get_string(&result.unwrap()), "2.5");
    assert_eq!(output, vec!["Point{1, 2}", r#"["a", "b"]"#, "a"]);
}

#[test]
fn test_deep_and_identity_equality() {
    let mut tb = TypeTableBuilder::new();
    let pair = tb.structure("Pair", &[TypeIdx::INT, TypeIdx::STRING], false);
    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 2);
    let x = b.string("x");
    let y = b.string("y");
    b.begin(main);
    emit_lines(
        &mut b,
        &[
            // 两个内容相同、字符串对象不同的结构体
            Op::PushInt(1),
            Op::PushStr(x),
            Op::PushStr(y),
            Op::SConcat,
            Op::NewStruct(pair),
            Op::StoreLocal(0),
            Op::PushInt(1),
            Op::PushStr(x),
            Op::PushStr(y),
            Op::SConcat,
            Op::NewStruct(pair),
            Op::StoreLocal(1),
            Op::LoadLocal(0),
            Op::LoadLocal(1),
            Op::Eq { ty: pair, deep: true },
            Op::LoadLocal(0),
            Op::LoadLocal(1),
            Op::Eq { ty: pair, deep: false },
            Op::LoadLocal(0),
            Op::Hash(pair),
            Op::LoadLocal(1),
            Op::Hash(pair),
            Op::IEq,
            Op::Return(3),
        ],
    );
    assert_eq!(ints(&run(b.finish().unwrap()).unwrap()), vec![1, 0, 1]);
}

#[test]
fn test_inline_struct_math() {
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(1),
            Op::PushInt(2),
            Op::PushInt(10),
            Op::PushInt(20),
            Op::IVAdd(2),
            Op::PushInt(3),
            Op::IVScale(2),
            Op::InlineField {
                width: 2,
                offset: 1,
                count: 1,
            },
            Op::PushFloat(0.5),
            Op::PushFloat(1.5),
            Op::PushFloat(0.5),
            Op::FVAdd(1),
            Op::FVAdd(1),
            Op::PushFloat(2.0),
            Op::FVScale(1),
            Op::F2I,
            Op::Return(2),
        ],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![66, 5]);
}

#[test]
fn test_boxing() {
    let p = main_only(
        builtin_types(),
        0,
        &[
            Op::PushInt(5),
            Op::BoxInt,
            Op::UnboxInt,
            Op::PushFloat(0.25),
            Op::BoxFloat,
            Op::UnboxFloat,
            Op::Return(2),
        ],
    );
    let result = run(p).unwrap();
    assert_eq!(result[0].ival(), 5);
    assert_eq!(result[1].fval(), 0.25);
}

// ===== 原生函数 =====

fn triple(ctx: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
    ctx.print(format!("triple({})", args[0].ival()));
    Ok(NativeRet::One(Value::int(args[0].ival() * 3)))
}

#[test]
fn test_native_calls() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let divmod = b.native(NativeSig::new(
        "divmod",
        &[TypeIdx::INT, TypeIdx::INT],
        &[TypeIdx::INT, TypeIdx::INT],
    ));
    let tri = b.native(NativeSig::new("triple", &[TypeIdx::INT], &[TypeIdx::INT]));
    b.begin(main);
    emit_lines(
        &mut b,
        &[
            Op::PushInt(17),
            Op::PushInt(5),
            Op::CallNative(divmod),
            Op::CallNative(tri),
            Op::Return(2),
        ],
    );

    let mut natives = NativeRegistry::with_builtins();
    natives.register(NativeSig::new("triple", &[TypeIdx::INT], &[TypeIdx::INT]), triple);
    let options = VmOptions {
        natives,
        ..VmOptions::default()
    };
    let mut vm = Vm::with_options(b.finish().unwrap(), options).unwrap();
    assert_eq!(ints(&vm.run().unwrap()), vec![3, 6]);
    assert_eq!(vm.output(), ["triple(2)"]);
}

#[test]
fn test_native_argument_checks() {
    let sig = NativeSig::new("abs", &[TypeIdx::INT], &[TypeIdx::INT]);

    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let abs = b.native(sig.clone());
    b.begin(main);
    emit_lines(&mut b, &[Op::PushFloat(1.0), Op::CallNative(abs), Op::Return(1)]);
    let err = run(b.finish().unwrap()).unwrap_err();
    assert!(matches!(err.error, VmError::NativeType { index: 0, .. }));

    // 参数窗口不越过局部变量
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 1);
    let abs = b.native(sig);
    b.begin(main);
    emit_lines(&mut b, &[Op::CallNative(abs), Op::Return(1)]);
    let err = run(b.finish().unwrap()).unwrap_err();
    assert_eq!(
        err.error,
        VmError::NativeArity {
            name: "abs".to_string(),
            expected: 1,
            got: 0,
        }
    );
}

#[test]
fn test_unknown_native_rejected_at_load() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    b.native(NativeSig::new("nope", &[], &[]));
    b.begin(main);
    b.emit(Op::PushNil, 1);
    b.op(Op::Return(1));
    match Vm::new(b.finish().unwrap()) {
        Err(LoadError::UnknownNative(name)) => assert_eq!(name, "nope"),
        other => panic!("expected UnknownNative, got {other:?}"),
    }
}

#[test]
fn test_native_signature_mismatch_rejected_at_load() {
    let load = |sig: NativeSig| {
        let mut b = ProgramBuilder::new(builtin_types());
        let main = b.function("main", 0, 0);
        b.native(sig);
        b.begin(main);
        b.emit(Op::PushNil, 1);
        b.op(Op::Return(1));
        Vm::new(b.finish().unwrap())
    };

    // abs(string) 与 abs() 都不能装载，原生函数不会看到错误种类的参数
    match load(NativeSig::new("abs", &[TypeIdx::STRING], &[TypeIdx::INT])) {
        Err(LoadError::NativeSignature { name, declared, .. }) => {
            assert_eq!(name, "abs");
            assert_eq!(declared, "(string) -> (int)");
        }
        other => panic!("expected NativeSignature, got {other:?}"),
    }
    assert!(matches!(
        load(NativeSig::new("abs", &[], &[TypeIdx::INT])),
        Err(LoadError::NativeSignature { .. })
    ));
    assert!(matches!(
        load(NativeSig::new("divmod", &[TypeIdx::INT, TypeIdx::INT], &[TypeIdx::INT])),
        Err(LoadError::NativeSignature { .. })
    ));
    assert!(load(NativeSig::new("abs", &[TypeIdx::INT], &[TypeIdx::INT])).is_ok());
}

// ===== 资源耗尽 =====

#[test]
fn test_call_depth_limit() {
    let mut b = ProgramBuilder::new(builtin_types());
    let main = b.function("main", 0, 0);
    let forever = b.function("forever", 0, 0);
    b.begin(main);
    b.emit(Op::Call(forever), 1);
    b.op(Op::Return(0));
    b.begin(forever);
    b.emit(Op::Call(forever), 2);
    b.op(Op::Return(0));

    let limits = LimitConfig {
        max_call_depth: 16,
        ..LimitConfig::default()
    };
    let err = run_limited(b.finish().unwrap(), limits).unwrap_err();
    assert_eq!(err.error, VmError::StackOverflow { limit: 16 });
    assert_eq!(err.function, "forever");
}

#[test]
fn test_stack_size_limit() {
    let ops: Vec<Op> = (0..8).map(Op::PushInt).chain([Op::Return(8)]).collect();
    let limits = LimitConfig {
        max_stack_size: 4,
        ..LimitConfig::default()
    };
    let err = run_limited(main_only(builtin_types(), 0, &ops), limits).unwrap_err();
    assert_eq!(err.error, VmError::StackOverflow { limit: 4 });
    assert_eq!(err.line, 5);
}

#[test]
fn test_vm_can_run_twice() {
    let p = main_only(
        builtin_types(),
        1,
        &[Op::PushInt(2), Op::PushInt(3), Op::IMul, Op::Return(1)],
    );
    let mut vm = Vm::new(p).unwrap();
    assert_eq!(get_int(&vm.run().unwrap()), 6);
    assert_eq!(get_int(&vm.run().unwrap()), 6);
    assert_eq!(vm.frame_depth(), 0);
}
