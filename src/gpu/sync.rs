//! GPU 同步机制模块
//!
//! 提供 CPU-GPU 同步所需的 Fence 记账。每次 `Context::submit` 分配一个新的
//! 单调递增 Fence 值，设备报告完成后更新已完成值；阻塞式提交就是等待
//! 已完成值追上最近一次提交的 Fence 值。
//!
//! 真正的等待由设备驱动完成（`DeviceDriver::wait_for`），这里只负责记账。

use std::sync::atomic::{AtomicU64, Ordering};

/// Fence 值
///
/// 用于 CPU-GPU 同步的单调递增值。0 表示“尚未提交任何工作”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 尚未提交任何工作
    pub const ZERO: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// 下一个 Fence 值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// 提交时是否阻塞等待 GPU 完成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum SyncToCpu {
    /// 提交后立即返回
    #[default]
    No = 0,
    /// 等待此前插入的所有 Recording 执行完毕后返回
    Yes = 1,
}

impl From<bool> for SyncToCpu {
    fn from(value: bool) -> Self {
        if value { SyncToCpu::Yes } else { SyncToCpu::No }
    }
}

/// Fence 管理器
///
/// 跟踪已提交（CPU 侧）与已完成（GPU 侧）的 Fence 值。
#[derive(Debug, Default)]
pub struct FenceManager {
    /// 最近一次提交的 Fence 值
    current_value: AtomicU64,
    /// 设备报告已完成的 Fence 值
    completed_value: AtomicU64,
}

impl FenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取最近一次提交的 Fence 值
    pub fn current_value(&self) -> FenceValue {
        FenceValue::new(self.current_value.load(Ordering::Acquire))
    }

    /// 获取已完成的 Fence 值
    pub fn completed_value(&self) -> FenceValue {
        FenceValue::new(self.completed_value.load(Ordering::Acquire))
    }

    /// 分配下一个 Fence 值并递增计数器
    pub fn next_value(&self) -> FenceValue {
        let value = self.current_value.fetch_add(1, Ordering::AcqRel);
        FenceValue::new(value + 1)
    }

    /// 更新已完成的 Fence 值
    ///
    /// 完成值只会前进，设备报告的旧值会被忽略。
    pub fn update_completed_value(&self, value: FenceValue) {
        self.completed_value.fetch_max(value.value(), Ordering::AcqRel);
    }

    /// 检查特定 Fence 值是否已完成
    pub fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }

    /// 是否还有已提交但未完成的工作
    pub fn has_outstanding(&self) -> bool {
        self.completed_value() < self.current_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::new(1);
        assert_eq!(fence.next().value(), 2);
        assert_eq!(fence.value(), 1); // 原值不变
        assert!(FenceValue::ZERO < fence);
    }

    #[test]
    fn test_fence_manager() {
        let manager = FenceManager::new();

        assert_eq!(manager.current_value(), FenceValue::ZERO);
        assert!(!manager.has_outstanding());

        let v1 = manager.next_value();
        let v2 = manager.next_value();
        assert_eq!(v1.value(), 1);
        assert_eq!(v2.value(), 2);
        assert!(manager.has_outstanding());

        // 模拟GPU完成
        manager.update_completed_value(v1);
        assert!(manager.is_completed(v1));
        assert!(!manager.is_completed(v2));

        manager.update_completed_value(v2);
        assert!(!manager.has_outstanding());
    }

    #[test]
    fn test_completed_value_is_monotonic() {
        let manager = FenceManager::new();
        manager.next_value();
        manager.next_value();

        manager.update_completed_value(FenceValue::new(2));
        manager.update_completed_value(FenceValue::new(1));
        assert_eq!(manager.completed_value().value(), 2);
    }
}
