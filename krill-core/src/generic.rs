//! 泛型操作：相等、哈希、格式化
//!
//! 都在展平的值切片上工作，由类型表决定按值结构体的字段边界；引用对象的
//! 类型取自对象头部。三者都用显式工作栈遍历对象图，嵌套深度不占原生栈。
//! 深比较用 (左身份, 右身份) 的 visited 集合防环，哈希与格式化用当前遍历
//! 路径防环。

use crate::object::{ObjKind, ObjRef};
use crate::types::{TypeIdx, TypeInfo, TypeTable};
use crate::value::{Float, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

// ==================== 相等 ====================

/// 比较两个类型为 `ti` 的展平值；`deep` 为假时引用按身份比较
///
/// 按值结构体逐字段比较等价于逐槽位比较，所以工作栈里只放单个槽位。
pub fn equals(types: &TypeTable, ti: TypeIdx, a: &[Value], b: &[Value], deep: bool) -> bool {
    debug_assert_eq!(a.len(), types.width(ti));
    if a.len() != b.len() {
        return false;
    }
    let mut cx = EqCx {
        deep,
        visited: HashSet::new(),
        work: Vec::new(),
    };
    cx.push_slots(a, b);
    cx.run()
}

struct EqCx {
    deep: bool,
    visited: HashSet<(usize, usize)>,
    work: Vec<(Value, Value)>,
}

impl EqCx {
    fn push_slots(&mut self, a: &[Value], b: &[Value]) {
        self.work.extend(a.iter().cloned().zip(b.iter().cloned()));
    }

    fn run(&mut self) -> bool {
        while let Some((a, b)) = self.work.pop() {
            let same = match (&a, &b) {
                (Value::Ref(x), Value::Ref(y)) => {
                    x.ptr_eq(y) || (self.deep && self.object(x, y))
                }
                _ => a.same(&b),
            };
            if !same {
                return false;
            }
        }
        true
    }

    /// 比较对象本身的内容，子槽位入栈
    fn object(&mut self, x: &ObjRef, y: &ObjRef) -> bool {
        if x.kind() != y.kind() {
            return false;
        }
        // 已在比较中的对：假定相等，由其余路径决定结果
        if !self.visited.insert((x.addr(), y.addr())) {
            return true;
        }
        match x.kind() {
            ObjKind::String => x.as_str() == y.as_str(),
            ObjKind::BoxedInt => x.boxed_int() == y.boxed_int(),
            ObjKind::BoxedFloat => x.boxed_float() == y.boxed_float(),
            ObjKind::Vector => {
                let (vx, vy) = (x.vector(), y.vector());
                if vx.len() != vy.len()
                    || vx.width() != vy.width()
                    || vx.elem_type() != vy.elem_type()
                {
                    return false;
                }
                self.push_slots(vx.values(), vy.values());
                true
            }
            ObjKind::Struct => {
                if x.type_index() != y.type_index() {
                    return false;
                }
                self.push_slots(x.structure().fields(), y.structure().fields());
                true
            }
            ObjKind::Resource | ObjKind::Coroutine => false,
        }
    }
}

// ==================== 哈希 ====================

/// 与深比较一致的结构哈希
pub fn hash(types: &TypeTable, ti: TypeIdx, v: &[Value]) -> u64 {
    debug_assert_eq!(v.len(), types.width(ti));
    let mut cx = HashCx {
        path: HashSet::new(),
        work: Vec::new(),
        h: DefaultHasher::new(),
    };
    cx.push_slots(v);
    cx.run();
    cx.h.finish()
}

enum HashItem {
    Value(Value),
    /// 对象的子槽位已全部处理，从路径上移除
    Leave(usize),
}

struct HashCx {
    path: HashSet<usize>,
    work: Vec<HashItem>,
    h: DefaultHasher,
}

impl HashCx {
    /// 倒序入栈，出栈顺序与槽位顺序一致
    fn push_slots(&mut self, v: &[Value]) {
        self.work.extend(v.iter().rev().cloned().map(HashItem::Value));
    }

    fn run(&mut self) {
        while let Some(item) = self.work.pop() {
            match item {
                HashItem::Value(v) => self.value(&v),
                HashItem::Leave(addr) => {
                    self.path.remove(&addr);
                }
            }
        }
    }

    fn value(&mut self, v: &Value) {
        match v {
            Value::Nil => 0u8.hash(&mut self.h),
            Value::Int(n) => {
                1u8.hash(&mut self.h);
                n.hash(&mut self.h);
            }
            Value::Float(f) => {
                2u8.hash(&mut self.h);
                float_bits(*f).hash(&mut self.h);
            }
            Value::Ip(ip) => {
                3u8.hash(&mut self.h);
                ip.hash(&mut self.h);
            }
            Value::Ref(obj) => self.object(obj),
        }
    }

    fn object(&mut self, obj: &ObjRef) {
        (obj.kind() as u8 + 4).hash(&mut self.h);
        match obj.kind() {
            ObjKind::String => obj.as_str().hash(&mut self.h),
            ObjKind::BoxedInt => obj.boxed_int().hash(&mut self.h),
            ObjKind::BoxedFloat => float_bits(obj.boxed_float()).hash(&mut self.h),
            ObjKind::Resource | ObjKind::Coroutine => obj.addr().hash(&mut self.h),
            ObjKind::Vector | ObjKind::Struct => {
                if !self.path.insert(obj.addr()) {
                    return;
                }
                self.work.push(HashItem::Leave(obj.addr()));
                if obj.kind() == ObjKind::Vector {
                    let v = obj.vector();
                    v.len().hash(&mut self.h);
                    self.push_slots(v.values());
                } else {
                    obj.type_index().hash(&mut self.h);
                    self.push_slots(obj.structure().fields());
                }
            }
        }
    }
}

/// 0.0 与 -0.0 相等，哈希也必须相同
fn float_bits(f: Float) -> impl Hash {
    let f: Float = if f == 0.0 { 0.0 } else { f };
    f.to_bits()
}

// ==================== 格式化 ====================

/// 格式化为可打印文本；顶层字符串原样输出，容器内的字符串带引号
pub fn format(types: &TypeTable, ti: TypeIdx, v: &[Value]) -> String {
    let mut cx = FmtCx {
        types,
        path: HashSet::new(),
        work: vec![FmtItem::Flat {
            ti,
            vals: v.to_vec(),
            nested: false,
        }],
        out: String::new(),
    };
    cx.run();
    cx.out
}

enum FmtItem {
    Text(&'static str),
    /// 一个类型为 `ti` 的展平值
    Flat {
        ti: TypeIdx,
        vals: Vec<Value>,
        nested: bool,
    },
    Leave(usize),
}

struct FmtCx<'a> {
    types: &'a TypeTable,
    path: HashSet<usize>,
    work: Vec<FmtItem>,
    out: String,
}

impl FmtCx<'_> {
    fn run(&mut self) {
        while let Some(item) = self.work.pop() {
            match item {
                FmtItem::Text(text) => self.out.push_str(text),
                FmtItem::Flat { ti, vals, nested } => self.flat(ti, &vals, nested),
                FmtItem::Leave(addr) => {
                    self.path.remove(&addr);
                }
            }
        }
    }

    fn flat(&mut self, ti: TypeIdx, v: &[Value], nested: bool) {
        let types = self.types;
        match types.get(ti) {
            TypeInfo::Struct(layout) if layout.by_value => {
                self.out.push_str(&layout.name);
                self.out.push('{');
                self.push_fields(ti, v);
                self.work.push(FmtItem::Text("}"));
            }
            _ => self.value(&v[0], nested),
        }
    }

    fn value(&mut self, v: &Value, nested: bool) {
        match v {
            Value::Nil => self.out.push_str("nil"),
            Value::Int(n) => {
                let _ = write!(self.out, "{n}");
            }
            Value::Float(f) => {
                let _ = write!(self.out, "{f:?}");
            }
            Value::Ip(ip) => {
                let _ = write!(self.out, "function@{}", ip.0);
            }
            Value::Ref(obj) => self.object(obj, nested),
        }
    }

    fn object(&mut self, obj: &ObjRef, nested: bool) {
        match obj.kind() {
            ObjKind::String if nested => {
                let _ = write!(self.out, "{:?}", obj.as_str());
            }
            ObjKind::String => self.out.push_str(obj.as_str()),
            ObjKind::BoxedInt => {
                let _ = write!(self.out, "{}", obj.boxed_int());
            }
            ObjKind::BoxedFloat => {
                let _ = write!(self.out, "{:?}", obj.boxed_float());
            }
            ObjKind::Resource => {
                let _ = write!(self.out, "resource<{}>", obj.resource().name());
            }
            ObjKind::Coroutine => {
                let _ = write!(self.out, "coroutine<{:?}>", obj.coroutine().state());
            }
            ObjKind::Vector | ObjKind::Struct => {
                if !self.path.insert(obj.addr()) {
                    self.out.push_str("...");
                    return;
                }
                self.work.push(FmtItem::Leave(obj.addr()));
                if obj.kind() == ObjKind::Vector {
                    let v = obj.vector();
                    let (elem, w) = (v.elem_type(), v.width());
                    self.out.push('[');
                    self.work.push(FmtItem::Text("]"));
                    let items: Vec<_> = (0..v.len())
                        .map(|i| (elem, &v.values()[i * w..(i + 1) * w]))
                        .collect();
                    self.push_items(&items);
                } else {
                    let (types, ti) = (self.types, obj.type_index());
                    self.out.push_str(&types.struct_layout(ti).name);
                    self.out.push('{');
                    self.work.push(FmtItem::Text("}"));
                    self.push_fields(ti, obj.structure().fields());
                }
            }
        }
    }

    /// 结构体各字段入栈（调用方已压入右括号）
    fn push_fields(&mut self, ti: TypeIdx, fields: &[Value]) {
        let types = self.types;
        let items: Vec<_> = types
            .struct_layout(ti)
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let (off, w) = types.field_offset(ti, i);
                (*f, &fields[off..off + w])
            })
            .collect();
        self.push_items(&items);
    }

    /// 逗号分隔的元素倒序入栈
    fn push_items(&mut self, items: &[(TypeIdx, &[Value])]) {
        for (i, (ti, vals)) in items.iter().enumerate().rev() {
            self.work.push(FmtItem::Flat {
                ti: *ti,
                vals: vals.to_vec(),
                nested: true,
            });
            if i > 0 {
                self.work.push(FmtItem::Text(", "));
            }
        }
    }
}
