//! Recording
//!
//! `Recorder::snap` 产生的不可变命令包。它按值移交给 `Context::insert_recording`，
//! 之后调用者不再持有它，因此"重复插入"在类型层面就不可能发生。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::command::RecordedPass;
use super::tracker::ResourceToken;

/// Recording 在提交协议中的状态
///
/// 调用者只能持有 `Snapped` 状态的 Recording，其余状态都发生在 Context 内部。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// 已从 Recorder 快照，尚未插入
    Snapped,
    /// 已进入 Context 的待提交队列
    Inserted,
    /// 已交给设备执行
    Submitted,
    /// 设备执行完毕，即将释放
    Consumed,
}

/// 一个 Recorder 最近被插入的快照序号
///
/// 由 Recorder 与它产生的所有 Recording 共享，全部释放后随之消失。
#[derive(Debug, Default)]
pub(crate) struct InsertCursor {
    /// 序号加一，0 表示尚未插入
    last: AtomicU64,
}

impl InsertCursor {
    pub(crate) fn last_inserted(&self) -> Option<u64> {
        self.last.load(Ordering::Acquire).checked_sub(1)
    }

    pub(crate) fn mark_inserted(&self, sequence: u64) {
        self.last.fetch_max(sequence.saturating_add(1), Ordering::AcqRel);
    }
}

/// 已快照的命令包
pub struct Recording {
    context_id: u64,
    recorder_id: u64,
    sequence: u64,
    cursor: Arc<InsertCursor>,
    passes: Vec<RecordedPass>,
    state: RecordingState,
    _token: ResourceToken,
}

impl Recording {
    pub(crate) fn new(
        context_id: u64,
        recorder_id: u64,
        sequence: u64,
        cursor: Arc<InsertCursor>,
        passes: Vec<RecordedPass>,
        token: ResourceToken,
    ) -> Self {
        Self {
            context_id,
            recorder_id,
            sequence,
            cursor,
            passes,
            state: RecordingState::Snapped,
            _token: token,
        }
    }

    /// 产生它的 Context
    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn recorder_id(&self) -> u64 {
        self.recorder_id
    }

    /// 在所属 Recorder 中的快照序号，从 0 开始
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn command_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.commands().len()).sum()
    }

    /// 空 Recording 同样有效，插入和提交都是空操作
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub(crate) fn cursor(&self) -> &InsertCursor {
        &self.cursor
    }

    pub(crate) fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub(crate) fn set_state(&mut self, state: RecordingState) {
        self.state = state;
    }
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("context_id", &self.context_id)
            .field("recorder_id", &self.recorder_id)
            .field("sequence", &self.sequence)
            .field("passes", &self.passes.len())
            .field("state", &self.state)
            .finish()
    }
}
