//! 原生函数桥
//!
//! 程序中记录原生函数签名；注册表中每个 Rust 函数也带着自己的签名。VM 构造时
//! 按名字绑定，两边签名不一致即为装载错误。调用前按程序签名校验参数窗口
//! （个数与种类），调用后校验返回值。
//!
//! 注册签名只使用内建类型；注册为 `any` 的位置接受程序中任意单槽位类型
//! （资源、向量等由原生函数自行检查）。
//! 所有权纪律与字节码相同：参数窗口的所有权转交给原生函数，返回值的所有权
//! 转交给栈。

use crate::error::{LoadError, VmError};
use crate::object::{ObjKind, ObjRef, ResourceObj, ResourceType};
use crate::types::{TypeIdx, TypeTable};
use crate::value::{Float, Int, Value};
use krill_config::Phase;
use krill_log::{debug, info, Logger};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// 原生函数签名
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSig {
    pub name: String,
    pub args: Vec<TypeIdx>,
    pub rets: Vec<TypeIdx>,
}

impl NativeSig {
    pub fn new(name: &str, args: &[TypeIdx], rets: &[TypeIdx]) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_vec(),
            rets: rets.to_vec(),
        }
    }

    /// `(int, string) -> (int)` 形式的签名文本
    pub fn display(&self, types: &TypeTable) -> String {
        let list = |ts: &[TypeIdx]| {
            ts.iter()
                .map(|t| types.name(*t))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("({}) -> ({})", list(&self.args), list(&self.rets))
    }

    /// 程序声明的签名 `declared` 是否满足本（注册）签名
    fn accepts(&self, types: &TypeTable, declared: &NativeSig) -> bool {
        let slot = |registered: &TypeIdx, declared: &TypeIdx| {
            registered == declared || (*registered == TypeIdx::ANY && types.width(*declared) == 1)
        };
        self.args.len() == declared.args.len()
            && self.rets.len() == declared.rets.len()
            && self.args.iter().zip(&declared.args).all(|(r, d)| slot(r, d))
            && self.rets.iter().zip(&declared.rets).all(|(r, d)| slot(r, d))
    }
}

/// 原生函数返回值
#[derive(Debug)]
pub enum NativeRet {
    Unit,
    One(Value),
    /// 额外返回值（例如按值结构体或多返回）
    Many(Vec<Value>),
}

impl NativeRet {
    pub fn into_values(self) -> Vec<Value> {
        match self {
            NativeRet::Unit => Vec::new(),
            NativeRet::One(v) => vec![v],
            NativeRet::Many(vs) => vs,
        }
    }
}

/// 原生函数可用的运行时上下文
pub struct NativeCtx<'a> {
    pub types: &'a TypeTable,
    pub logger: &'a Arc<Logger>,
    pub output: &'a mut Vec<String>,
}

impl NativeCtx<'_> {
    /// 分配字符串（计数为 1）
    pub fn alloc_string(&self, s: &str) -> Value {
        Value::obj(ObjRef::new_string(TypeIdx::STRING, s))
    }

    /// 分配资源对象（计数为 1），计数归零时 `ty.destroy` 恰好运行一次
    ///
    /// 对象头部记为程序类型表中同名的资源类型；没有同名条目时记为 `any`。
    pub fn alloc_resource(&self, ty: &'static ResourceType, payload: Box<dyn Any>) -> Value {
        let ti = self.types.find_resource(ty.name).unwrap_or(TypeIdx::ANY);
        debug!(self.logger, target: Phase::Native.target(), "allocated resource `{}`", ty.name);
        Value::obj(ObjRef::new_resource(ti, ResourceObj::new(ty, payload)))
    }

    /// 追加到输出缓冲区
    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }
}

/// 借用参数中的资源负载
///
/// 参数不是资源、资源描述符不符或负载类型不符时报告 `ResourceType` 错误。
pub fn resource_arg<'v, T: 'static>(
    v: &'v Value,
    expected: &'static ResourceType,
) -> Result<&'v T, VmError> {
    match v {
        Value::Ref(obj) if obj.kind() == ObjKind::Resource => obj.resource().payload(expected),
        Value::Ref(obj) => Err(VmError::ResourceType {
            expected: expected.name,
            got: obj.kind().as_str(),
        }),
        other => Err(VmError::ResourceType {
            expected: expected.name,
            got: other.kind().as_str(),
        }),
    }
}

pub type NativeFn = fn(&mut NativeCtx<'_>, Vec<Value>) -> Result<NativeRet, VmError>;

/// 名字 → (注册签名, 原生函数)
#[derive(Clone, Default)]
pub struct NativeRegistry {
    fns: HashMap<String, (NativeSig, NativeFn)>,
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.fns.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("NativeRegistry").field("fns", &names).finish()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 带内建函数的注册表
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        builtins::register(&mut r);
        r
    }

    /// 以签名注册（同名覆盖），返回旧函数
    ///
    /// 签名只能引用内建类型，否则 panic。
    #[track_caller]
    pub fn register(&mut self, sig: NativeSig, f: NativeFn) -> Option<NativeFn> {
        assert!(
            sig.args.iter().chain(&sig.rets).all(|t| t.is_builtin()),
            "native `{}` registered with a non-builtin type",
            sig.name
        );
        self.fns
            .insert(sig.name.clone(), (sig, f))
            .map(|(_, old)| old)
    }

    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.fns.get(name).map(|(_, f)| *f)
    }

    /// 注册时给出的签名
    pub fn signature(&self, name: &str) -> Option<&NativeSig> {
        self.fns.get(name).map(|(sig, _)| sig)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fns.is_empty()
    }

    /// 按程序中的签名顺序绑定；名字未注册或签名不一致时拒绝装载
    pub fn bind(&self, types: &TypeTable, sigs: &[NativeSig]) -> Result<Vec<NativeFn>, LoadError> {
        sigs.iter()
            .map(|declared| {
                let (registered, f) = self
                    .fns
                    .get(&declared.name)
                    .ok_or_else(|| LoadError::UnknownNative(declared.name.clone()))?;
                if !registered.accepts(types, declared) {
                    return Err(LoadError::NativeSignature {
                        name: declared.name.clone(),
                        registered: registered.display(types),
                        declared: declared.display(types),
                    });
                }
                Ok(*f)
            })
            .collect()
    }
}

// ==================== 校验 ====================

fn describe(v: &Value) -> String {
    match v {
        Value::Ref(obj) => obj.kind().as_str().to_string(),
        other => other.kind().as_str().to_string(),
    }
}

/// 参数窗口校验
pub(crate) fn check_args(types: &TypeTable, sig: &NativeSig, args: &[Value]) -> Result<(), VmError> {
    let expected = types.total_width(&sig.args);
    if args.len() != expected {
        return Err(VmError::NativeArity {
            name: sig.name.clone(),
            expected,
            got: args.len(),
        });
    }
    let mut at = 0;
    for (index, ti) in sig.args.iter().enumerate() {
        let w = types.width(*ti);
        let window = &args[at..at + w];
        if !types.admits_flat(*ti, window) {
            return Err(VmError::NativeType {
                name: sig.name.clone(),
                index,
                expected: types.name(*ti),
                got: window.iter().map(describe).collect::<Vec<_>>().join(", "),
            });
        }
        at += w;
    }
    Ok(())
}

/// 返回值校验（槽位数与种类）
pub(crate) fn check_rets(types: &TypeTable, sig: &NativeSig, rets: &[Value]) -> Result<(), VmError> {
    let expected = types.total_width(&sig.rets);
    if rets.len() != expected {
        return Err(VmError::NativeReturn {
            name: sig.name.clone(),
            expected,
            got: rets.len(),
        });
    }
    let mut at = 0;
    for (index, ti) in sig.rets.iter().enumerate() {
        let w = types.width(*ti);
        let window = &rets[at..at + w];
        if !types.admits_flat(*ti, window) {
            return Err(VmError::NativeReturnType {
                name: sig.name.clone(),
                index,
                expected: types.name(*ti),
                got: window.iter().map(describe).collect::<Vec<_>>().join(", "),
            });
        }
        at += w;
    }
    Ok(())
}

// ==================== 内建函数 ====================

pub mod builtins {
    //! 随运行时提供的少量原生函数

    use super::*;
    use std::cell::RefCell;

    const INT: TypeIdx = TypeIdx::INT;
    const FLOAT: TypeIdx = TypeIdx::FLOAT;
    const STRING: TypeIdx = TypeIdx::STRING;
    const ANY: TypeIdx = TypeIdx::ANY;

    pub fn register(r: &mut NativeRegistry) {
        r.register(NativeSig::new("abs", &[INT], &[INT]), abs);
        r.register(NativeSig::new("sqrt", &[FLOAT], &[FLOAT]), sqrt);
        r.register(NativeSig::new("str_find", &[STRING, STRING], &[INT]), str_find);
        r.register(NativeSig::new("divmod", &[INT, INT], &[INT, INT]), divmod);
        r.register(NativeSig::new("log", &[STRING], &[]), log);
        r.register(NativeSig::new("sb_new", &[], &[ANY]), sb_new);
        r.register(NativeSig::new("sb_push", &[ANY, STRING], &[]), sb_push);
        r.register(NativeSig::new("sb_finish", &[ANY], &[STRING]), sb_finish);
    }

    /// `abs(int) -> int`
    pub fn abs(_: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        Ok(NativeRet::One(Value::int(args[0].ival().wrapping_abs())))
    }

    /// `sqrt(float) -> float`
    pub fn sqrt(_: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        let x: Float = args[0].fval();
        Ok(NativeRet::One(Value::float(x.sqrt())))
    }

    /// `str_find(haystack, needle) -> int`，未找到为 -1
    pub fn str_find(_: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        let hay = args[0].as_obj().as_str();
        let needle = args[1].as_obj().as_str();
        let at = hay.find(needle).map(|i| i as Int).unwrap_or(-1);
        Ok(NativeRet::One(Value::int(at)))
    }

    /// `divmod(a, b) -> (int, int)`
    pub fn divmod(_: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        let (a, b) = (args[0].ival(), args[1].ival());
        if b == 0 {
            return Err(VmError::DivisionByZero);
        }
        Ok(NativeRet::Many(vec![
            Value::int(a.wrapping_div(b)),
            Value::int(a.wrapping_rem(b)),
        ]))
    }

    /// `log(string)`：以 info 级别写入日志
    pub fn log(ctx: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        info!(ctx.logger, target: Phase::Native.target(), "{}", args[0].as_obj().as_str());
        Ok(NativeRet::Unit)
    }

    // ===== 字符串构建器（资源）=====

    fn drop_builder(_payload: Box<dyn Any>) {}

    /// 程序中对应的资源类型名为 `string_builder`
    pub static STRING_BUILDER: ResourceType = ResourceType {
        name: "string_builder",
        destroy: drop_builder,
    };

    /// `sb_new() -> resource<string_builder>`
    pub fn sb_new(ctx: &mut NativeCtx<'_>, _: Vec<Value>) -> Result<NativeRet, VmError> {
        let payload: Box<dyn Any> = Box::new(RefCell::new(String::new()));
        Ok(NativeRet::One(ctx.alloc_resource(&STRING_BUILDER, payload)))
    }

    /// `sb_push(builder, string)`
    pub fn sb_push(_: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        let buf = resource_arg::<RefCell<String>>(&args[0], &STRING_BUILDER)?;
        buf.borrow_mut().push_str(args[1].as_obj().as_str());
        Ok(NativeRet::Unit)
    }

    /// `sb_finish(builder) -> string`：复制当前内容，构建器保持不变
    pub fn sb_finish(ctx: &mut NativeCtx<'_>, args: Vec<Value>) -> Result<NativeRet, VmError> {
        let buf = resource_arg::<RefCell<String>>(&args[0], &STRING_BUILDER)?;
        let text = buf.borrow();
        Ok(NativeRet::One(ctx.alloc_string(&text)))
    }
}
