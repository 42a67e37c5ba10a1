//! 资源生命周期追踪
//!
//! `ResourceTracker` 统计各类绑定对象的存活数量，是外部检查“无泄漏、无重复释放”的钩子。
//! 通过 `ContextOptions::resource_tracker` 安装，由该 Context 派生的所有对象共享。
//!
//! 每个被追踪的对象内嵌一个 `ResourceToken`：创建时计数 +1，`Drop` 时 -1，
//! 因此释放次数与创建次数总是一一对应。

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// 被追踪的对象种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Context,
    Recorder,
    Recording,
    Surface,
    /// 驱动分配或包装的渲染目标
    RenderTarget,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Context,
        ResourceKind::Recorder,
        ResourceKind::Recording,
        ResourceKind::Surface,
        ResourceKind::RenderTarget,
    ];

    fn index(self) -> usize {
        match self {
            ResourceKind::Context => 0,
            ResourceKind::Recorder => 1,
            ResourceKind::Recording => 2,
            ResourceKind::Surface => 3,
            ResourceKind::RenderTarget => 4,
        }
    }
}

const KIND_COUNT: usize = ResourceKind::ALL.len();

/// 资源追踪器
#[derive(Default)]
pub struct ResourceTracker {
    live: [AtomicUsize; KIND_COUNT],
    created: [AtomicU64; KIND_COUNT],
}

impl ResourceTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record_created(&self, kind: ResourceKind) {
        self.live[kind.index()].fetch_add(1, Ordering::AcqRel);
        self.created[kind.index()].fetch_add(1, Ordering::AcqRel);
    }

    fn record_released(&self, kind: ResourceKind) {
        let previous = self.live[kind.index()].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "{:?} released more often than created", kind);
    }

    /// 当前存活数量
    pub fn live(&self, kind: ResourceKind) -> usize {
        self.live[kind.index()].load(Ordering::Acquire)
    }

    /// 累计创建数量
    pub fn created(&self, kind: ResourceKind) -> u64 {
        self.created[kind.index()].load(Ordering::Acquire)
    }

    /// 所有种类的存活数量之和
    pub fn total_live(&self) -> usize {
        ResourceKind::ALL.iter().map(|kind| self.live(*kind)).sum()
    }

    /// 是否所有对象都已释放
    pub fn all_released(&self) -> bool {
        self.total_live() == 0
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in ResourceKind::ALL {
            map.entry(&kind, &self.live(kind));
        }
        map.finish()
    }
}

/// 作用域追踪令牌
///
/// 没有安装追踪器时是空操作。
pub(crate) struct ResourceToken {
    tracker: Option<Arc<ResourceTracker>>,
    kind: ResourceKind,
}

impl ResourceToken {
    pub(crate) fn new(tracker: Option<&Arc<ResourceTracker>>, kind: ResourceKind) -> Self {
        if let Some(tracker) = tracker {
            tracker.record_created(kind);
        }
        Self {
            tracker: tracker.cloned(),
            kind,
        }
    }

    pub(crate) fn tracker(&self) -> Option<&Arc<ResourceTracker>> {
        self.tracker.as_ref()
    }
}

impl Drop for ResourceToken {
    fn drop(&mut self) {
        if let Some(tracker) = &self.tracker {
            tracker.record_released(self.kind);
        }
    }
}

impl fmt::Debug for ResourceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceToken")
            .field("kind", &self.kind)
            .field("tracked", &self.tracker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pairs_create_and_release() {
        let tracker = ResourceTracker::new();

        let a = ResourceToken::new(Some(&tracker), ResourceKind::Recorder);
        let b = ResourceToken::new(Some(&tracker), ResourceKind::Recorder);
        let c = ResourceToken::new(Some(&tracker), ResourceKind::Surface);
        assert_eq!(tracker.live(ResourceKind::Recorder), 2);
        assert_eq!(tracker.total_live(), 3);

        drop(a);
        drop(c);
        assert_eq!(tracker.live(ResourceKind::Recorder), 1);
        assert_eq!(tracker.live(ResourceKind::Surface), 0);

        drop(b);
        assert!(tracker.all_released());
        assert_eq!(tracker.created(ResourceKind::Recorder), 2);
    }

    #[test]
    fn test_untracked_token_is_noop() {
        let token = ResourceToken::new(None, ResourceKind::Context);
        assert!(token.tracker().is_none());
    }
}
