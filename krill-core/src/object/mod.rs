//! 堆对象定义
//!
//! 所有引用对象共享同一个头部：类型表下标 + 存活计数。计数由 `Rc` 的强引用
//! 计数承担，`ObjRef::clone` 即 increment，`drop` 即 decrement；计数归零时
//! 对象被释放（恰好一次），并记入 [`crate::heap`] 统计。

mod coroutine;
mod resource;
mod string;
mod structs;
mod vector;

pub use coroutine::{CoState, CoroutineObj, ResumeLink, SavedState};
pub use resource::{ResourceObj, ResourceType};
pub use string::StringObj;
pub use structs::StructObj;
pub use vector::{VecLayout, VectorObj};

use crate::heap;
use crate::types::TypeIdx;
use crate::value::{Float, Int};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// 对象种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjKind {
    String = 0,
    Vector = 1,
    Struct = 2,
    BoxedInt = 3,
    BoxedFloat = 4,
    Resource = 5,
    Coroutine = 6,
}

impl ObjKind {
    pub const COUNT: usize = 7;

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjKind::String => "string",
            ObjKind::Vector => "vector",
            ObjKind::Struct => "struct",
            ObjKind::BoxedInt => "boxed int",
            ObjKind::BoxedFloat => "boxed float",
            ObjKind::Resource => "resource",
            ObjKind::Coroutine => "coroutine",
        }
    }
}

/// 对象体
///
/// 可变的对象（Vector、Coroutine）包在 `RefCell` 里；其余对象创建后不可变。
pub enum ObjBody {
    String(StringObj),
    Vector(RefCell<VectorObj>),
    Struct(StructObj),
    BoxedInt(Int),
    BoxedFloat(Float),
    Resource(ResourceObj),
    Coroutine(RefCell<CoroutineObj>),
}

impl ObjBody {
    fn kind(&self) -> ObjKind {
        match self {
            ObjBody::String(_) => ObjKind::String,
            ObjBody::Vector(_) => ObjKind::Vector,
            ObjBody::Struct(_) => ObjKind::Struct,
            ObjBody::BoxedInt(_) => ObjKind::BoxedInt,
            ObjBody::BoxedFloat(_) => ObjKind::BoxedFloat,
            ObjBody::Resource(_) => ObjKind::Resource,
            ObjBody::Coroutine(_) => ObjKind::Coroutine,
        }
    }
}

/// 堆对象：头部 + 对象体
pub struct HeapObj {
    type_index: TypeIdx,
    body: ObjBody,
}

impl Drop for HeapObj {
    fn drop(&mut self) {
        heap::record_free(self.body.kind());
    }
}

/// 持有所有权的对象句柄
#[derive(Clone)]
pub struct ObjRef(Rc<HeapObj>);

impl ObjRef {
    // ==================== 分配 ====================

    /// 分配新对象，计数从 1 开始
    pub fn alloc(type_index: TypeIdx, body: ObjBody) -> Self {
        heap::record_alloc(body.kind());
        ObjRef(Rc::new(HeapObj { type_index, body }))
    }

    pub fn new_string(type_index: TypeIdx, s: &str) -> Self {
        Self::alloc(type_index, ObjBody::String(StringObj::new(s)))
    }

    pub fn new_vector(type_index: TypeIdx, v: VectorObj) -> Self {
        Self::alloc(type_index, ObjBody::Vector(RefCell::new(v)))
    }

    pub fn new_struct(type_index: TypeIdx, s: StructObj) -> Self {
        Self::alloc(type_index, ObjBody::Struct(s))
    }

    pub fn new_boxed_int(type_index: TypeIdx, n: Int) -> Self {
        Self::alloc(type_index, ObjBody::BoxedInt(n))
    }

    pub fn new_boxed_float(type_index: TypeIdx, f: Float) -> Self {
        Self::alloc(type_index, ObjBody::BoxedFloat(f))
    }

    pub fn new_resource(type_index: TypeIdx, r: ResourceObj) -> Self {
        Self::alloc(type_index, ObjBody::Resource(r))
    }

    pub fn new_coroutine(type_index: TypeIdx, co: CoroutineObj) -> Self {
        Self::alloc(type_index, ObjBody::Coroutine(RefCell::new(co)))
    }

    // ==================== 头部 ====================

    #[inline]
    pub fn type_index(&self) -> TypeIdx {
        self.0.type_index
    }

    #[inline]
    pub fn kind(&self) -> ObjKind {
        self.0.body.kind()
    }

    /// 当前存活计数
    #[inline]
    pub fn refc(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// 对象身份（用于环检测的 visited 集合）
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    #[inline]
    pub fn body(&self) -> &ObjBody {
        &self.0.body
    }

    // ==================== 按种类访问 ====================
    //
    // 种类不匹配是程序错误。

    #[track_caller]
    pub fn string(&self) -> &StringObj {
        match &self.0.body {
            ObjBody::String(s) => s,
            _ => self.wrong_kind(ObjKind::String),
        }
    }

    #[track_caller]
    pub fn as_str(&self) -> &str {
        self.string().as_str()
    }

    #[track_caller]
    pub fn vector(&self) -> Ref<'_, VectorObj> {
        match &self.0.body {
            ObjBody::Vector(v) => v.borrow(),
            _ => self.wrong_kind(ObjKind::Vector),
        }
    }

    #[track_caller]
    pub fn vector_mut(&self) -> RefMut<'_, VectorObj> {
        match &self.0.body {
            ObjBody::Vector(v) => v.borrow_mut(),
            _ => self.wrong_kind(ObjKind::Vector),
        }
    }

    #[track_caller]
    pub fn structure(&self) -> &StructObj {
        match &self.0.body {
            ObjBody::Struct(s) => s,
            _ => self.wrong_kind(ObjKind::Struct),
        }
    }

    #[track_caller]
    pub fn boxed_int(&self) -> Int {
        match &self.0.body {
            ObjBody::BoxedInt(n) => *n,
            _ => self.wrong_kind(ObjKind::BoxedInt),
        }
    }

    #[track_caller]
    pub fn boxed_float(&self) -> Float {
        match &self.0.body {
            ObjBody::BoxedFloat(f) => *f,
            _ => self.wrong_kind(ObjKind::BoxedFloat),
        }
    }

    #[track_caller]
    pub fn resource(&self) -> &ResourceObj {
        match &self.0.body {
            ObjBody::Resource(r) => r,
            _ => self.wrong_kind(ObjKind::Resource),
        }
    }

    #[track_caller]
    pub fn coroutine(&self) -> Ref<'_, CoroutineObj> {
        match &self.0.body {
            ObjBody::Coroutine(c) => c.borrow(),
            _ => self.wrong_kind(ObjKind::Coroutine),
        }
    }

    #[track_caller]
    pub fn coroutine_mut(&self) -> RefMut<'_, CoroutineObj> {
        match &self.0.body {
            ObjBody::Coroutine(c) => c.borrow_mut(),
            _ => self.wrong_kind(ObjKind::Coroutine),
        }
    }

    #[cold]
    #[track_caller]
    fn wrong_kind(&self, expected: ObjKind) -> ! {
        panic!(
            "object kind mismatch: expected {}, found {}",
            expected.as_str(),
            self.kind().as_str()
        )
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 不递归打印内容，避免环
        write!(
            f,
            "<{} #{} @{:#x} refc={}>",
            self.kind().as_str(),
            self.type_index().0,
            self.addr(),
            self.refc()
        )
    }
}
