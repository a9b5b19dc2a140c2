//! 最近一次投递结果的单槽缓存（ResultCache）
//!
//! 只保留最新值，不保留历史。底层是 `tokio::sync::watch`：
//! 写入是对 `Copy` 值的整体替换，并发写入后槽内总是某一次完整写入的结果；
//! 读取不触达 broker 或仓储，可直接服务同步查询。
//!
use futures_core::stream::BoxStream;
use futures_util::{StreamExt, future};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub const SUCCESS_MESSAGE: &str = "Email have been sent successfully!";
pub const FAILURE_MESSAGE: &str = "Email unable to send out";

/// 一次投递的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchResult {
    Success,
    Failure,
}

impl DispatchResult {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => SUCCESS_MESSAGE,
            Self::Failure => FAILURE_MESSAGE,
        }
    }
}

impl fmt::Display for DispatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// 单槽结果缓存；克隆得到的是同一个槽的句柄
#[derive(Clone, Debug)]
pub struct ResultCache {
    slot: Arc<watch::Sender<Option<DispatchResult>>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖当前结果
    pub fn record(&self, success: bool) -> DispatchResult {
        let result = DispatchResult::from_success(success);
        self.slot.send_replace(Some(result));
        result
    }

    /// 最新结果；进程启动后尚无投递时为 `None`
    pub fn latest(&self) -> Option<DispatchResult> {
        *self.slot.borrow()
    }

    /// 最新结果的展示文本
    pub fn read(&self) -> Option<&'static str> {
        self.latest().map(|r| r.message())
    }

    /// 订阅此后的每一次写入（慢消费者只会看到最新值）
    pub fn updates(&self) -> BoxStream<'static, DispatchResult> {
        WatchStream::from_changes(self.slot.subscribe())
            .filter_map(future::ready)
            .boxed()
    }
}
