//! 向量测试
//!
//! 字节码层面的向量指令，以及对照 `Vec` 模型的随机化测试

mod common;
use common::{assert_balanced, ints, main_only, run};
use krill_core::heap;
use krill_core::object::{VecLayout, VectorObj};
use krill_core::{
    Int, LoadError, ObjRef, Op, ProgramBuilder, TypeIdx, TypeTableBuilder, Value, VmError,
};
use proptest::prelude::*;

// ===== 字节码 =====

#[test]
fn test_vector_ops() {
    let mut tb = TypeTableBuilder::new();
    let ints_ty = tb.vector(TypeIdx::INT);
    let p = main_only(
        tb.build().unwrap(),
        1,
        &[
            Op::PushInt(1),
            Op::PushInt(2),
            Op::PushInt(3),
            Op::NewVec { ty: ints_ty, n: 3 },
            Op::StoreLocal(0),
            // push 4 → [1, 2, 3, 4]
            Op::PushInt(4),
            Op::LoadLocal(0),
            Op::VecPush,
            // insert 0 at 0 → [0, 1, 2, 3, 4]
            Op::PushInt(0),
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::VecInsert,
            // remove two at 1 → 1; [0, 3, 4]
            Op::LoadLocal(0),
            Op::PushInt(1),
            Op::VecRemove { count: 2 },
            // pop → 4; [0, 3]
            Op::LoadLocal(0),
            Op::VecPop,
            Op::LoadLocal(0),
            Op::VecTop,
            // set [0] = 9 → [9, 3]
            Op::PushInt(9),
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::VecSet,
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::VecAt,
            Op::LoadLocal(0),
            Op::VecLen,
            Op::LoadLocal(0),
            Op::VecCap,
            Op::Return(6),
        ],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![1, 4, 3, 9, 2, 6]);
}

#[test]
fn test_vector_index_out_of_range() {
    let mut tb = TypeTableBuilder::new();
    let ints_ty = tb.vector(TypeIdx::INT);
    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 0);
    let get = b.function("get", 0, 0);

    b.begin(main);
    b.emit(Op::Call(get), 1);
    b.op(Op::Return(1));

    b.begin(get);
    b.emit(Op::PushInt(7), 20);
    b.op(Op::PushInt(8));
    b.op(Op::PushInt(9));
    b.op(Op::NewVec { ty: ints_ty, n: 3 });
    b.emit(Op::PushInt(5), 21);
    b.emit(Op::VecAt, 22);
    b.op(Op::Return(1));

    let before = heap::stats();
    let err = run(b.finish().unwrap()).unwrap_err();
    assert_eq!(err.error, VmError::IndexOutOfRange { index: 5, len: 3 });
    assert_eq!(err.function, "get");
    assert_eq!(err.line, 22);
    assert_eq!(err.to_string(), "get:22: index 5 out of range (length 3)");
    assert_balanced(&before);
}

#[test]
fn test_pop_empty_vector() {
    let mut tb = TypeTableBuilder::new();
    let ints_ty = tb.vector(TypeIdx::INT);
    let p = main_only(
        tb.build().unwrap(),
        0,
        &[Op::NewVec { ty: ints_ty, n: 0 }, Op::VecPop, Op::Return(1)],
    );
    assert_eq!(run(p).unwrap_err().error, VmError::EmptyVector);
}

#[test]
fn test_vector_of_inline_structs() {
    let mut tb = TypeTableBuilder::new();
    let point = tb.structure("Point", &[TypeIdx::INT, TypeIdx::INT], true);
    let points = tb.vector(point);
    let p = main_only(
        tb.build().unwrap(),
        1,
        &[
            Op::PushInt(1),
            Op::PushInt(2),
            Op::PushInt(3),
            Op::PushInt(4),
            Op::NewVec { ty: points, n: 2 },
            Op::StoreLocal(0),
            Op::PushInt(5),
            Op::PushInt(6),
            Op::LoadLocal(0),
            Op::VecPush,
            Op::LoadLocal(0),
            Op::PushInt(2),
            Op::VecAt,
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::VecAt,
            Op::InlineField {
                width: 2,
                offset: 1,
                count: 1,
            },
            Op::LoadLocal(0),
            Op::VecLen,
            Op::Return(4),
        ],
    );
    assert_eq!(ints(&run(p).unwrap()), vec![5, 6, 2, 3]);
}

#[test]
fn test_self_append_and_resize_release() {
    let mut tb = TypeTableBuilder::new();
    let strs = tb.vector(TypeIdx::STRING);
    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 1);
    let a = b.string("a");
    let bb = b.string("b");
    b.begin(main);
    common::emit_lines(
        &mut b,
        &[
            Op::PushStr(a),
            Op::PushStr(bb),
            Op::SConcat,
            Op::NewVec { ty: strs, n: 1 },
            Op::StoreLocal(0),
            Op::LoadLocal(0),
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::PushInt(1),
            Op::VecAppend,
            Op::LoadLocal(0),
            Op::LoadLocal(0),
            Op::PushInt(0),
            Op::PushInt(2),
            Op::VecAppend,
            Op::LoadLocal(0),
            Op::VecLen,
            Op::LoadLocal(0),
            Op::PushInt(1),
            Op::VecResize,
            Op::LoadLocal(0),
            Op::VecLen,
            Op::LoadLocal(0),
            Op::VecCap,
            Op::Return(3),
        ],
    );

    let before = heap::stats();
    assert_eq!(ints(&run(b.finish().unwrap()).unwrap()), vec![4, 1, 1]);
    assert_balanced(&before);
}

#[test]
fn test_append_range_checked() {
    let mut tb = TypeTableBuilder::new();
    let ints_ty = tb.vector(TypeIdx::INT);
    let p = main_only(
        tb.build().unwrap(),
        0,
        &[
            Op::NewVec { ty: ints_ty, n: 0 },
            Op::PushInt(1),
            Op::PushInt(2),
            Op::NewVec { ty: ints_ty, n: 2 },
            Op::PushInt(1),
            Op::PushInt(2),
            Op::VecAppend,
            Op::PushNil,
            Op::Return(1),
        ],
    );
    assert!(matches!(
        run(p).unwrap_err().error,
        VmError::IndexOutOfRange { len: 2, .. }
    ));
}

#[test]
fn test_remove_zero_rejected() {
    let mut tb = TypeTableBuilder::new();
    let ints_ty = tb.vector(TypeIdx::INT);
    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 0);
    b.begin(main);
    b.emit(Op::NewVec { ty: ints_ty, n: 0 }, 1);
    b.op(Op::PushInt(0));
    b.op(Op::VecRemove { count: 0 });
    b.op(Op::Return(1));
    assert!(matches!(
        b.finish(),
        Err(LoadError::BadIndex { what: "count", .. })
    ));
}

// ===== 随机化 =====

#[derive(Debug, Clone)]
enum VecOp {
    Push(Int),
    Pop,
    Insert(usize, Int),
    Remove(usize, usize),
    Resize(usize),
}

fn vec_op() -> impl Strategy<Value = VecOp> {
    prop_oneof![
        any::<Int>().prop_map(VecOp::Push),
        Just(VecOp::Pop),
        (0usize..12, any::<Int>()).prop_map(|(i, v)| VecOp::Insert(i, v)),
        (0usize..12, 0usize..4).prop_map(|(i, c)| VecOp::Remove(i, c)),
        (0usize..16).prop_map(VecOp::Resize),
    ]
}

fn int_layout() -> VecLayout {
    VecLayout {
        elem_type: TypeIdx::INT,
        width: 1,
        zero: vec![Value::int(0)],
        holds_refs: false,
    }
}

proptest! {
    #[test]
    fn prop_vector_matches_model(ops in prop::collection::vec(vec_op(), 0..64)) {
        let mut v = VectorObj::new(&int_layout(), 0, 0).unwrap();
        let mut model: Vec<Int> = Vec::new();

        for op in ops {
            match op {
                VecOp::Push(x) => {
                    v.push([Value::int(x)]).unwrap();
                    model.push(x);
                }
                VecOp::Pop => match model.pop() {
                    Some(x) => prop_assert_eq!(v.pop().unwrap()[0].ival(), x),
                    None => prop_assert_eq!(v.pop().unwrap_err(), VmError::EmptyVector),
                },
                VecOp::Insert(i, x) => {
                    let r = v.insert(i as Int, [Value::int(x)]);
                    if i <= model.len() {
                        prop_assert!(r.is_ok());
                        model.insert(i, x);
                    } else {
                        prop_assert!(r.is_err());
                    }
                }
                VecOp::Remove(i, c) => {
                    let r = v.remove(i as Int, c as Int);
                    if i + c <= model.len() {
                        let removed: Vec<Int> = model.drain(i..i + c).collect();
                        prop_assert_eq!(r.unwrap().iter().map(Value::ival).collect::<Vec<_>>(), removed);
                    } else {
                        prop_assert!(r.is_err());
                    }
                }
                VecOp::Resize(cap) => {
                    v.resize(cap as Int).unwrap();
                    model.truncate(cap);
                    prop_assert_eq!(v.capacity(), cap);
                }
            }
            prop_assert!(v.len() <= v.capacity());
            prop_assert_eq!(v.len(), model.len());
            prop_assert_eq!(v.values().iter().map(Value::ival).collect::<Vec<_>>(), model.clone());
        }
    }

    #[test]
    fn prop_string_vector_releases_everything(
        words in prop::collection::vec("[a-z]{0,6}", 0..16),
        keep in 0usize..16,
    ) {
        let before = heap::stats();
        {
            let layout = VecLayout {
                elem_type: TypeIdx::STRING,
                width: 1,
                zero: vec![Value::Nil],
                holds_refs: true,
            };
            let mut v = VectorObj::new(&layout, 0, 0).unwrap();
            let mut held = Vec::new();
            for w in &words {
                let s = Value::obj(ObjRef::new_string(TypeIdx::STRING, w));
                held.push(s.clone());
                v.push([s]).unwrap();
            }
            for (i, s) in held.iter().enumerate() {
                prop_assert_eq!(s.refc(), Some(2), "element {}", i);
            }
            v.resize(keep.min(words.len()) as Int).unwrap();
            for (i, s) in held.iter().enumerate() {
                let expected = if i < keep { 2 } else { 1 };
                prop_assert_eq!(s.refc(), Some(expected));
            }
        }
        assert_balanced(&before);
    }
}
