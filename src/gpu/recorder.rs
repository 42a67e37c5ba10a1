//! Recorder
//!
//! 单线程的录制会话。Surface 的绘制调用追加到 Recorder 的命令缓冲，
//! `snap` 把所有命令移交给一个新的 Recording 并清空缓冲。
//!
//! Recorder 只持有 Context 共享状态的弱引用：Context 销毁后继续使用 Recorder
//! 会得到 `InvalidState(ContextInvalid)`，而不是悬垂访问。
//! 命令缓冲使用 `Rc<RefCell<_>>` 与其创建的 Surface 共享，因此 Recorder 不是 `Send`。

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::backend_context::BackendApi;
use super::command::{next_object_id, CommandSink};
use super::context::ContextShared;
use super::options::RecorderOptions;
use super::recording::{InsertCursor, Recording};
use super::tracker::{ResourceKind, ResourceToken, ResourceTracker};
use crate::core::error::{BridgeError, ConstructionError, Result, StateError};
use crate::{bridge_debug, bridge_warn};

/// GPU 内存预算
///
/// 由 Recorder 与其分配的渲染目标共享；渲染目标释放时归还预算，
/// 即使 Recorder 已经先行销毁。
#[derive(Debug)]
pub struct GpuBudget {
    limit: Option<u64>,
    used: AtomicU64,
}

impl GpuBudget {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// 预留 `bytes` 字节，超出上限时失败且不做任何修改
    pub fn try_reserve(&self, bytes: u64) -> Result<()> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(bytes, Ordering::AcqRel);
            return Ok(());
        };
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|used| {
                BridgeError::Construction(ConstructionError::BudgetExceeded {
                    requested: bytes,
                    available: limit.saturating_sub(used),
                })
            })
    }

    pub fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| Some(used.saturating_sub(bytes)));
    }
}

/// 录制会话
pub struct Recorder {
    id: u64,
    context: Weak<ContextShared>,
    options: RecorderOptions,
    budget: Arc<GpuBudget>,
    sink: Rc<RefCell<CommandSink>>,
    next_sequence: u64,
    cursor: Arc<InsertCursor>,
    _token: ResourceToken,
}

impl Recorder {
    pub(crate) fn new(shared: &Arc<ContextShared>, options: RecorderOptions) -> Self {
        let id = next_object_id();
        bridge_debug!(
            recorder = id,
            context = shared.id,
            budget = ?options.gpu_budget_bytes,
            "Recorder created"
        );
        Self {
            id,
            context: Arc::downgrade(shared),
            budget: Arc::new(GpuBudget::new(options.gpu_budget_bytes)),
            options,
            sink: Rc::new(RefCell::new(CommandSink::default())),
            next_sequence: 0,
            cursor: Arc::new(InsertCursor::default()),
            _token: ResourceToken::new(shared.tracker(), ResourceKind::Recorder),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    /// 所属 Context 仍然存在且可用
    pub fn is_valid(&self) -> bool {
        self.context.upgrade().map_or(false, |shared| shared.is_usable())
    }

    /// 所属 Context 的后端，Context 已销毁时返回 None
    pub fn backend(&self) -> Option<BackendApi> {
        self.context.upgrade().map(|shared| shared.api)
    }

    /// 渲染目标当前占用的 GPU 字节数
    pub fn gpu_budget_used(&self) -> u64 {
        self.budget.used()
    }

    pub fn max_budget_bytes(&self) -> Option<u64> {
        self.budget.limit()
    }

    /// 是否有尚未快照的命令
    pub fn has_pending_work(&self) -> bool {
        !self.sink.borrow().is_empty()
    }

    /// 把所有待录制命令移交给一个新的 Recording
    ///
    /// 未录制任何命令时得到一个空但有效的 Recording；Recorder 随后可继续使用。
    pub fn snap(&mut self) -> Result<Recording> {
        let shared = self.shared()?;
        let passes = self.sink.borrow_mut().take();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        bridge_debug!(
            recorder = self.id,
            sequence,
            passes = passes.len(),
            "Recording snapped"
        );
        Ok(Recording::new(
            shared.id,
            self.id,
            sequence,
            Arc::clone(&self.cursor),
            passes,
            ResourceToken::new(self.tracker(), ResourceKind::Recording),
        ))
    }

    pub(crate) fn shared(&self) -> Result<Arc<ContextShared>> {
        match self.context.upgrade() {
            Some(shared) if shared.is_usable() => Ok(shared),
            _ => {
                bridge_warn!(recorder = self.id, "Recorder used after its context became invalid");
                Err(BridgeError::InvalidState(StateError::ContextInvalid))
            }
        }
    }

    pub(crate) fn sink(&self) -> &Rc<RefCell<CommandSink>> {
        &self.sink
    }

    pub(crate) fn budget(&self) -> &Arc<GpuBudget> {
        &self.budget
    }

    pub(crate) fn tracker(&self) -> Option<&Arc<ResourceTracker>> {
        self._token.tracker()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.has_pending_work() {
            bridge_debug!(recorder = self.id, "Recorder dropped with unsnapped commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_budget() {
        let budget = GpuBudget::new(None);
        budget.try_reserve(u64::MAX / 2).unwrap();
        assert_eq!(budget.used(), u64::MAX / 2);
        budget.release(u64::MAX / 2);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_budget_limit() {
        let budget = GpuBudget::new(Some(100));
        budget.try_reserve(60).unwrap();

        let err = budget.try_reserve(50).unwrap_err();
        match err {
            BridgeError::Construction(ConstructionError::BudgetExceeded { requested, available }) => {
                assert_eq!(requested, 50);
                assert_eq!(available, 40);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(budget.used(), 60);

        budget.release(60);
        budget.try_reserve(100).unwrap();
    }
}
