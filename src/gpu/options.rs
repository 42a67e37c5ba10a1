//! Context / Recorder 选项
//!
//! 纯配置值类型，默认构造、可复制，不拥有任何 GPU 资源。

use std::sync::Arc;

use super::tracker::ResourceTracker;
use crate::core::config::{ContextConfig, RecorderConfig};

/// Context 选项
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// 待提交 Recording 队列容量，队列满时插入失败
    pub max_pending_recordings: usize,

    /// 为 true 时，同一 Recorder 的 Recording 必须按 snap 顺序插入
    pub require_ordered_recordings: bool,

    /// 调试标签
    pub label: Option<String>,

    /// 资源追踪钩子，由该 Context 派生的所有对象共享
    pub resource_tracker: Option<Arc<ResourceTracker>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_pending_recordings: 64,
            require_ordered_recordings: false,
            label: None,
            resource_tracker: None,
        }
    }
}

impl ContextOptions {
    pub fn with_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.resource_tracker = Some(tracker);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl From<&ContextConfig> for ContextOptions {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_pending_recordings: config.max_pending_recordings,
            require_ordered_recordings: config.require_ordered_recordings,
            ..Self::default()
        }
    }
}

/// Recorder 选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderOptions {
    /// 该 Recorder 分配的渲染目标可占用的 GPU 字节数，None 表示不限制
    pub gpu_budget_bytes: Option<u64>,

    /// 调试标签
    pub label: Option<String>,
}

impl From<&RecorderConfig> for RecorderOptions {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            gpu_budget_bytes: config.gpu_budget_bytes,
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = ContextConfig {
            max_pending_recordings: 3,
            require_ordered_recordings: true,
        };
        let options = ContextOptions::from(&config);
        assert_eq!(options.max_pending_recordings, 3);
        assert!(options.require_ordered_recordings);
        assert!(options.resource_tracker.is_none());

        let recorder = RecorderOptions::from(&RecorderConfig { gpu_budget_bytes: Some(64) });
        assert_eq!(recorder.gpu_budget_bytes, Some(64));
    }

    #[test]
    fn test_options_are_value_copies() {
        let original = ContextOptions::default().with_label("main");
        let mut copy = original.clone();
        copy.label = Some("other".into());
        copy.max_pending_recordings = 1;

        assert_eq!(original.label.as_deref(), Some("main"));
        assert_eq!(original.max_pending_recordings, 64);
    }
}
