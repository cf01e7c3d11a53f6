//! 引用计数测试
//!
//! 随机构造/复制/丢弃后堆计数必须回到原点

mod common;
use common::{assert_balanced, get_int, run};
use krill_core::heap;
use krill_core::object::{StructObj, VectorObj};
use krill_core::{
    Int, ObjRef, Op, ProgramBuilder, TypeIdx, TypeTable, TypeTableBuilder, Value,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Action {
    NewString(String),
    NewBoxed(Int),
    /// 从池中挑选若干元素组成向量
    NewVector(Vec<usize>),
    /// 两个字段的引用结构体
    NewStruct(usize, usize),
    /// 替换结构体的一个字段
    Replace(usize, usize),
    Copy(usize),
    Drop(usize),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[a-z]{0,4}".prop_map(Action::NewString),
        any::<Int>().prop_map(Action::NewBoxed),
        prop::collection::vec(0usize..32, 0..4).prop_map(Action::NewVector),
        (0usize..32, 0usize..32).prop_map(|(a, b)| Action::NewStruct(a, b)),
        (0usize..32, 0usize..32).prop_map(|(a, b)| Action::Replace(a, b)),
        (0usize..32).prop_map(Action::Copy),
        (0usize..32).prop_map(Action::Drop),
    ]
}

struct Types {
    table: TypeTable,
    anys: TypeIdx,
    pair: TypeIdx,
}

fn types() -> Types {
    let mut tb = TypeTableBuilder::new();
    let anys = tb.vector(TypeIdx::ANY);
    let pair = tb.structure("Pair", &[TypeIdx::ANY, TypeIdx::ANY], false);
    Types {
        table: tb.build().unwrap(),
        anys,
        pair,
    }
}

fn pick(pool: &[Value], i: usize) -> Value {
    if pool.is_empty() {
        Value::Nil
    } else {
        pool[i % pool.len()].clone()
    }
}

fn apply(t: &Types, pool: &mut Vec<Value>, action: Action) {
    match action {
        Action::NewString(s) => pool.push(Value::obj(ObjRef::new_string(TypeIdx::STRING, &s))),
        Action::NewBoxed(n) => pool.push(Value::obj(ObjRef::new_boxed_int(TypeIdx::BOXED_INT, n))),
        Action::NewVector(picks) => {
            let layout = t.table.vector_layout(t.anys);
            let mut v = VectorObj::new(&layout, 0, 0).unwrap();
            for i in picks {
                v.push([pick(pool, i)]).unwrap();
            }
            pool.push(Value::obj(ObjRef::new_vector(t.anys, v)));
        }
        Action::NewStruct(a, b) => {
            let fields = vec![pick(pool, a), pick(pool, b)];
            pool.push(Value::obj(ObjRef::new_struct(t.pair, StructObj::new(fields))));
        }
        Action::Replace(s, v) => {
            let target = pick(pool, s);
            let Value::Ref(obj) = &target else { return };
            if obj.type_index() != t.pair {
                return;
            }
            let fresh = obj.structure().replace(1, vec![pick(pool, v)]);
            pool.push(Value::obj(ObjRef::new_struct(t.pair, fresh)));
        }
        Action::Copy(i) => {
            let v = pick(pool, i);
            pool.push(v);
        }
        Action::Drop(i) => {
            if !pool.is_empty() {
                let at = i % pool.len();
                pool.swap_remove(at);
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_random_graph_releases_everything(actions in prop::collection::vec(action(), 0..64)) {
        let t = types();
        let before = heap::stats();
        {
            let mut pool: Vec<Value> = Vec::new();
            for a in actions {
                apply(&t, &mut pool, a);
                for v in &pool {
                    if let Some(n) = v.refc() {
                        prop_assert!(n >= 1);
                    }
                }
            }
            prop_assert_eq!(heap::live() - before.live(), count_unique(&pool));
        }
        assert_balanced(&before);
        prop_assert_eq!(heap::live(), before.live());
    }
}

/// 从池出发可达的不同对象数
fn count_unique(pool: &[Value]) -> u64 {
    let mut seen = std::collections::HashSet::new();
    let mut work: Vec<ObjRef> = pool
        .iter()
        .filter_map(|v| v.as_nilable_obj().cloned())
        .collect();
    while let Some(obj) = work.pop() {
        if !seen.insert(obj.addr()) {
            continue;
        }
        let children: Vec<Value> = match obj.kind() {
            krill_core::ObjKind::Vector => obj.vector().values().to_vec(),
            krill_core::ObjKind::Struct => obj.structure().fields().to_vec(),
            _ => Vec::new(),
        };
        work.extend(children.iter().filter_map(|v| v.as_nilable_obj().cloned()));
    }
    seen.len() as u64
}

#[test]
fn test_copy_and_drop_pairing() {
    let before = heap::stats();
    let s = Value::obj(ObjRef::new_string(TypeIdx::STRING, "shared"));
    assert_eq!(s.refc(), Some(1));

    let copy = s.increment_ownership();
    let clone = s.clone();
    assert_eq!(s.refc(), Some(3));
    assert!(copy.same(&s));

    copy.decrement_ownership();
    drop(clone);
    assert_eq!(s.refc(), Some(1));
    assert_eq!(heap::live(), before.live() + 1);

    s.decrement_ownership();
    assert_balanced(&before);
    assert_eq!(heap::live(), before.live());
}

#[test]
fn test_replace_never_mutates_alias() {
    let t = types();
    let before = heap::stats();
    {
        let name = Value::obj(ObjRef::new_string(TypeIdx::STRING, "old"));
        let original = ObjRef::new_struct(t.pair, StructObj::new(vec![Value::int(1), name.clone()]));
        let alias = original.clone();

        let fresh = original
            .structure()
            .replace(1, vec![Value::obj(ObjRef::new_string(TypeIdx::STRING, "new"))]);
        let fresh = ObjRef::new_struct(t.pair, fresh);

        assert_eq!(alias.structure().at(1).as_obj().as_str(), "old");
        assert_eq!(fresh.structure().at(1).as_obj().as_str(), "new");
        assert_eq!(fresh.structure().at(0).ival(), 1);
        // original + 调用方各一份
        assert_eq!(name.refc(), Some(2));
    }
    assert_balanced(&before);
}

#[test]
fn test_program_built_linked_list_releases_iteratively() {
    // Node { value: int, next: Node? }
    const LEN: Int = 300_000;
    let mut tb = TypeTableBuilder::new();
    let node = tb.structure("Node", &[TypeIdx::INT, TypeIdx(7)], false);
    assert_eq!(tb.nilable(node), TypeIdx(7));

    let mut b = ProgramBuilder::new(tb.build().unwrap());
    let main = b.function("main", 0, 2);
    b.begin(main);
    b.emit(Op::PushNil, 1);
    b.op(Op::StoreLocal(1));
    b.op(Op::PushInt(0));
    b.op(Op::StoreLocal(0));
    let top = b.label();
    let end = b.label();
    b.bind(top);
    b.emit(Op::LoadLocal(0), 2);
    b.op(Op::PushInt(LEN));
    b.op(Op::ILt);
    b.jump_if_false(end);
    b.emit(Op::LoadLocal(0), 3);
    b.op(Op::LoadLocal(1));
    b.op(Op::NewStruct(node));
    b.op(Op::StoreLocal(1));
    b.emit(Op::LoadLocal(0), 4);
    b.op(Op::PushInt(1));
    b.op(Op::IAdd);
    b.op(Op::StoreLocal(0));
    b.jump(top);
    b.bind(end);
    b.emit(Op::LoadLocal(1), 5);
    b.op(Op::StructAt { ty: node, field: 0 });
    b.op(Op::Return(1));
    let program = b.finish().unwrap();

    let before = heap::stats();
    // 返回时局部变量里的整条链表被释放
    assert_eq!(get_int(&run(program).unwrap()), LEN - 1);
    assert_balanced(&before);
    assert_eq!(heap::live(), before.live());
}
