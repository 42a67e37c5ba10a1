//! 引用计数原生句柄
//!
//! `Retained<K>` 是带引用计数的原生对象（如 Metal 的 `MTLDevice` / `MTLCommandQueue`）
//! 的作用域守卫：构造时 retain 一次，`Drop` 时 release 一次，`Clone` 再 retain 一次。
//! 句柄从不以裸指针形式脱离守卫暴露给上层。

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// 原生对象的 retain / release 操作
///
/// # Safety
///
/// 实现者必须保证 `retain` 使对象引用计数加一、`release` 减一，
/// 并且两者对任何存活的同类对象指针都是合法调用。
pub unsafe trait RetainRelease {
    /// 对象种类名，用于调试输出
    const NAME: &'static str;

    unsafe fn retain(raw: NonNull<c_void>);
    unsafe fn release(raw: NonNull<c_void>);
}

/// 持有一次强引用的原生句柄
pub struct Retained<K: RetainRelease> {
    raw: NonNull<c_void>,
    _kind: PhantomData<K>,
}

impl<K: RetainRelease> Retained<K> {
    /// retain 一次并接管这次引用，空指针返回 None
    ///
    /// # Safety
    ///
    /// `raw` 必须指向一个存活的 `K` 类对象。
    pub unsafe fn retain(raw: *const c_void) -> Option<Self> {
        let raw = NonNull::new(raw as *mut c_void)?;
        K::retain(raw);
        Some(Self {
            raw,
            _kind: PhantomData,
        })
    }

    /// 借出裸指针，不转移所有权
    pub fn as_ptr(&self) -> *mut c_void {
        self.raw.as_ptr()
    }
}

impl<K: RetainRelease> Clone for Retained<K> {
    fn clone(&self) -> Self {
        unsafe { K::retain(self.raw) };
        Self {
            raw: self.raw,
            _kind: PhantomData,
        }
    }
}

impl<K: RetainRelease> Drop for Retained<K> {
    fn drop(&mut self) {
        unsafe { K::release(self.raw) }
    }
}

impl<K: RetainRelease> fmt::Debug for Retained<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(K::NAME).field(&self.raw).finish()
    }
}

// 持有的是线程安全的引用计数对象（Metal 设备与队列允许跨线程使用）
unsafe impl<K: RetainRelease> Send for Retained<K> {}
unsafe impl<K: RetainRelease> Sync for Retained<K> {}

/// Objective-C 对象（通过 `retain` / `release` 消息管理引用计数）
#[cfg(target_os = "macos")]
pub enum ObjcObject {}

#[cfg(target_os = "macos")]
unsafe impl RetainRelease for ObjcObject {
    const NAME: &'static str = "ObjcObject";

    unsafe fn retain(raw: NonNull<c_void>) {
        use objc::runtime::Object;
        use objc::{msg_send, sel, sel_impl};

        let obj = raw.as_ptr() as *mut Object;
        let _: *mut Object = msg_send![obj, retain];
    }

    unsafe fn release(raw: NonNull<c_void>) {
        use objc::runtime::Object;
        use objc::{msg_send, sel, sel_impl};

        let obj = raw.as_ptr() as *mut Object;
        let _: () = msg_send![obj, release];
    }
}
