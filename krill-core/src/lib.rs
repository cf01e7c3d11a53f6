//! Krill Core - runtime core (pure logic, no IO)
//!
//! Contains the value representation, the refcounted object model, the
//! load-time type table, the program format, the interpreter loop and the
//! coroutine engine. Only operates on in-memory data structures; printing goes
//! to a captured output buffer and diagnostics go through an explicitly passed
//! `krill_log::Logger`.
//!
//! Configuration is passed explicitly via parameters, not via global state.

pub mod bytecode;
pub mod error;
pub mod generic;
pub mod heap;
pub mod native;
pub mod object;
pub mod types;
pub mod value;
pub mod vm;

// Re-export common types
pub use bytecode::{FuncIdx, FunctionInfo, NativeIdx, Op, Program, ProgramBuilder, StrIdx};
pub use error::{LoadError, RunError, VmError};
pub use native::{resource_arg, NativeCtx, NativeFn, NativeRegistry, NativeRet, NativeSig};
pub use object::{CoState, ObjKind, ObjRef, ResourceType};
pub use types::{StructLayout, TypeIdx, TypeInfo, TypeTable, TypeTableBuilder};
pub use value::{Float, InsPtr, Int, Value};
pub use vm::{Vm, VmOptions};

// Re-export config types from krill-config
pub use krill_config::{LimitConfig, Phase, VmConfig};
