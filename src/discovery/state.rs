//! 后端生命周期状态

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// 后端生命周期状态
///
/// `Uninitialized → Connected → Registered → Watching → Degraded`。
/// `Degraded` 在重新注册成功（或重新建立监听）后回到 `Registered`/`Watching`，
/// 不会自动进入终止状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    Uninitialized,
    Connected,
    Registered,
    Watching,
    Degraded,
}

impl DiscoveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryState::Uninitialized => "uninitialized",
            DiscoveryState::Connected => "connected",
            DiscoveryState::Registered => "registered",
            DiscoveryState::Watching => "watching",
            DiscoveryState::Degraded => "degraded",
        }
    }
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 由各个后台任务独立更新的状态位，`current()` 按优先级折叠为 [`DiscoveryState`]
#[derive(Debug, Default)]
pub(crate) struct StateFlags {
    connected: AtomicBool,
    registered: AtomicBool,
    watching: AtomicBool,
    degraded: AtomicBool,
}

impl StateFlags {
    pub(crate) fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }

    pub(crate) fn set_registered(&self, value: bool) {
        self.registered.store(value, Ordering::Release);
    }

    pub(crate) fn set_watching(&self, value: bool) {
        self.watching.store(value, Ordering::Release);
    }

    pub(crate) fn set_degraded(&self, value: bool) {
        let previous = self.degraded.swap(value, Ordering::AcqRel);
        if previous != value {
            tracing::debug!(degraded = value, "discovery state changed");
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn current(&self) -> DiscoveryState {
        if self.degraded.load(Ordering::Acquire) {
            DiscoveryState::Degraded
        } else if self.watching.load(Ordering::Acquire) {
            DiscoveryState::Watching
        } else if self.registered.load(Ordering::Acquire) {
            DiscoveryState::Registered
        } else if self.connected.load(Ordering::Acquire) {
            DiscoveryState::Connected
        } else {
            DiscoveryState::Uninitialized
        }
    }
}
