//! Metal 后端上下文
//!
//! 构造时对设备与命令队列各 retain 一次，销毁时各 release 一次；
//! 克隆上下文会再 retain 一次。

use std::ffi::c_void;

use foreign_types::ForeignTypeRef;
use tracing::info;

use crate::core::error::{BridgeError, Result};
use crate::gpu::handle::{ObjcObject, Retained};

/// Metal 后端上下文
#[derive(Debug, Clone)]
pub struct MtlBackendContext {
    device: Retained<ObjcObject>,
    queue: Retained<ObjcObject>,
}

impl MtlBackendContext {
    /// 由调用者提供的 `id<MTLDevice>` 与 `id<MTLCommandQueue>` 构造
    ///
    /// # Safety
    ///
    /// 非空指针必须分别指向存活的 `MTLDevice` 与属于该设备的 `MTLCommandQueue`。
    pub unsafe fn new(device: *const c_void, queue: *const c_void) -> Result<Self> {
        let device = Retained::retain(device)
            .ok_or_else(|| BridgeError::device_init("MTLDevice handle is null"))?;
        let queue = Retained::retain(queue)
            .ok_or_else(|| BridgeError::device_init("MTLCommandQueue handle is null"))?;
        Ok(Self { device, queue })
    }

    /// 显式请求系统默认设备
    pub fn system_default() -> Result<Self> {
        use foreign_types::ForeignType;

        let device = metal::Device::system_default()
            .ok_or_else(|| BridgeError::device_init("no Metal device available"))?;
        let queue = device.new_command_queue();
        info!("Metal 设备: {}", device.name());
        // 局部的 device / queue 在返回时各自 release，上下文持有的引用保持平衡
        unsafe { Self::new(device.as_ptr() as *const c_void, queue.as_ptr() as *const c_void) }
    }

    pub fn device(&self) -> &metal::DeviceRef {
        unsafe { metal::DeviceRef::from_ptr(self.device.as_ptr() as *mut _) }
    }

    pub fn queue(&self) -> &metal::CommandQueueRef {
        unsafe { metal::CommandQueueRef::from_ptr(self.queue.as_ptr() as *mut _) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objc::runtime::Object;
    use objc::{msg_send, sel, sel_impl};

    fn retain_count(ptr: *mut c_void) -> usize {
        unsafe { msg_send![ptr as *mut Object, retainCount] }
    }

    #[test]
    fn test_null_handles_are_rejected() {
        let err = unsafe { MtlBackendContext::new(std::ptr::null(), std::ptr::null()) }.unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::ConstructionFailure);
    }

    /// 没有 Metal 设备时跳过
    #[test]
    fn test_clone_and_drop_balance_retains() {
        let Ok(ctx) = MtlBackendContext::system_default() else {
            return;
        };
        let device = ctx.device.as_ptr();
        let before = retain_count(device);
        {
            let copies: Vec<_> = (0..4).map(|_| ctx.clone()).collect();
            assert_eq!(retain_count(device), before + copies.len());
        }
        assert_eq!(retain_count(device), before);
    }
}
