//! 资源对象：不透明负载 + (名字, 析构函数) 描述符
//!
//! 资源由包装对象独占；计数归零时析构函数恰好运行一次。

use crate::error::VmError;
use std::any::Any;
use std::fmt;

/// 资源类型描述符，通常以 `static` 声明
///
/// ```
/// use krill_core::ResourceType;
/// use std::any::Any;
///
/// fn close(_payload: Box<dyn Any>) {}
/// static FILE: ResourceType = ResourceType { name: "file", destroy: close };
/// assert_eq!(FILE.name, "file");
/// ```
pub struct ResourceType {
    pub name: &'static str,
    pub destroy: fn(Box<dyn Any>),
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType").field("name", &self.name).finish()
    }
}

pub struct ResourceObj {
    ty: &'static ResourceType,
    payload: Option<Box<dyn Any>>,
}

impl ResourceObj {
    pub fn new(ty: &'static ResourceType, payload: Box<dyn Any>) -> Self {
        Self {
            ty,
            payload: Some(payload),
        }
    }

    #[inline]
    pub fn resource_type(&self) -> &'static ResourceType {
        self.ty
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.ty.name
    }

    /// 借用负载；描述符或负载类型不符时报告 `ResourceType` 错误
    pub fn payload<T: 'static>(&self, expected: &'static ResourceType) -> Result<&T, VmError> {
        let mismatch = || VmError::ResourceType {
            expected: expected.name,
            got: self.ty.name,
        };
        if !std::ptr::eq(self.ty, expected) {
            return Err(mismatch());
        }
        self.payload
            .as_ref()
            .and_then(|p| p.downcast_ref::<T>())
            .ok_or_else(mismatch)
    }
}

impl Drop for ResourceObj {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            (self.ty.destroy)(payload);
        }
    }
}

impl fmt::Debug for ResourceObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({})", self.ty.name)
    }
}
