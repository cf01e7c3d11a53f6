//! 虚拟机
//!
//! 单线程、协作式。一个共享的 Value 栈 + 显式帧栈，由当前 Running 的执行
//! （主程序或活动协程链的最内层）独占。指令分派见 `execution`，协程引擎见
//! `coroutine`。
//!
//! 用户级运行时错误（越界、除零、断言失败、原生函数参数不符、资源耗尽）
//! 以 `VmError` 返回，在 [`Vm::run`] 中统一展开：标记活动协程为 Done，
//! 清空栈与帧栈，每个值恰好释放一次。

mod abi;
mod arith;
mod call;
mod collections;
mod coroutine;
mod execution;
mod frame;
mod stack;

pub use frame::Frame;

use crate::bytecode::{FuncIdx, Program};
use crate::error::{LoadError, RunError, VmError};
use crate::heap;
use crate::native::{NativeFn, NativeRegistry};
use crate::object::ObjRef;
use crate::types::{TypeIdx, TypeTable};
use crate::value::{InsPtr, Value};
use krill_config::{LimitConfig, Phase, VmConfig};
use krill_log::{debug, error, info, warn, Logger};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// VM 构造选项
#[derive(Debug, Clone)]
pub struct VmOptions {
    pub limits: LimitConfig,
    pub vm: VmConfig,
    pub logger: Arc<Logger>,
    pub natives: NativeRegistry,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            limits: LimitConfig::default(),
            vm: VmConfig::default(),
            logger: Logger::noop(),
            natives: NativeRegistry::with_builtins(),
        }
    }
}

/// 虚拟机
pub struct Vm {
    /// 不可变程序（类型表、代码、常量）
    pub(crate) program: Rc<Program>,
    /// 共享值栈
    pub(crate) stack: Vec<Value>,
    /// 调用帧栈
    pub(crate) frames: Vec<Frame>,
    /// 活动协程链，最内层在末尾
    pub(crate) active: Vec<ObjRef>,
    /// 下一条要执行的指令
    pub(crate) ip: usize,
    /// 字符串常量池（装载时分配一次）
    pub(crate) strings: Vec<ObjRef>,
    /// 与 `program.natives` 一一对应
    pub(crate) natives: Vec<NativeFn>,
    /// 函数入口 → 函数（间接调用）
    pub(crate) entries: HashMap<InsPtr, FuncIdx>,
    /// Print 的输出
    pub(crate) output: Vec<String>,
    pub(crate) limits: LimitConfig,
    pub(crate) config: VmConfig,
    pub(crate) logger: Arc<Logger>,
    live_at_start: u64,
}

impl Vm {
    /// 使用默认选项创建
    pub fn new(program: Program) -> Result<Self, LoadError> {
        Self::with_options(program, VmOptions::default())
    }

    /// 校验程序、绑定原生函数并分配字符串常量
    pub fn with_options(program: impl Into<Rc<Program>>, options: VmOptions) -> Result<Self, LoadError> {
        let program: Rc<Program> = program.into();
        program.validate()?;
        let natives = options.natives.bind(&program.types, &program.natives)?;

        let live_at_start = heap::live();
        let strings = program
            .strings
            .iter()
            .map(|s| ObjRef::new_string(TypeIdx::STRING, s))
            .collect();
        let entries = program
            .functions
            .iter()
            .enumerate()
            .map(|(i, f)| (f.entry, FuncIdx(i as u32)))
            .collect();

        info!(
            options.logger,
            target: Phase::Load.target(),
            "loaded program: {} types, {} functions, {} instructions, {} natives",
            program.types.len(),
            program.functions.len(),
            program.code.len(),
            natives.len()
        );

        Ok(Self {
            stack: Vec::with_capacity(options.vm.initial_stack_size),
            frames: Vec::with_capacity(options.vm.initial_frames_capacity),
            active: Vec::new(),
            ip: 0,
            strings,
            natives,
            entries,
            output: Vec::new(),
            limits: options.limits,
            config: options.vm,
            logger: options.logger,
            program,
            live_at_start,
        })
    }

    // ==================== 执行 ====================

    /// 从入口函数开始执行，返回入口函数的返回值
    pub fn run(&mut self) -> Result<Vec<Value>, RunError> {
        self.reset();
        let main = self.program.entry;
        debug!(
            self.logger,
            target: Phase::Vm.target(),
            "run `{}`",
            self.program.function(main).name
        );

        let started = call::enter_main(self, main).and_then(|()| execution::run(self));
        match started {
            Ok(values) => {
                debug!(
                    self.logger,
                    target: Phase::Vm.target(),
                    "run finished with {} value(s)",
                    values.len()
                );
                Ok(values)
            }
            Err(error) => {
                let err = self.locate(error);
                error!(self.logger, target: Phase::Vm.target(), "{}", err);
                self.unwind();
                Err(err)
            }
        }
    }

    /// 把错误定位到当前函数与行号
    fn locate(&self, error: VmError) -> RunError {
        let function = match self.frames.last() {
            Some(frame) => self.program.function(frame.func).name.clone(),
            None => "<toplevel>".to_string(),
        };
        // ip 已经越过出错的指令
        let line = self.program.line_at(self.ip.saturating_sub(1));
        RunError {
            error,
            function,
            line,
            coroutine_depth: self.active.len(),
        }
    }

    /// 错误展开：沿活动协程链从内到外标记 Done，然后释放共享栈
    pub(crate) fn unwind(&mut self) {
        let depth = self.active.len();
        while let Some(co) = self.active.pop() {
            co.coroutine_mut().kill();
        }
        while let Some(frame) = self.frames.pop() {
            self.stack.truncate(frame.base);
        }
        self.stack.clear();
        if depth > 0 {
            debug!(
                self.logger,
                target: Phase::Coroutine.target(),
                "unwound {} active coroutine(s)",
                depth
            );
        }
    }

    /// 清空执行状态（不触及输出与常量池）
    fn reset(&mut self) {
        self.unwind();
        self.ip = 0;
    }

    // ==================== 访问器 ====================

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn types(&self) -> &TypeTable {
        &self.program.types
    }

    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Print 产生的输出
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// 当前帧栈深度
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.unwind();
        self.strings.clear();
        if !self.config.report_leaks || std::thread::panicking() {
            return;
        }
        let live = heap::live();
        if live > self.live_at_start {
            warn!(
                self.logger,
                target: Phase::Vm.target(),
                "{} object(s) still alive at shutdown (held by the embedder or in reference cycles)",
                live - self.live_at_start
            );
        }
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("ip", &self.ip)
            .field("stack", &self.stack.len())
            .field("frames", &self.frames.len())
            .field("active_coroutines", &self.active.len())
            .finish()
    }
}
