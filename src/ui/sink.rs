//! UI 网关出站端：抽象事件接收器
//!
//! 编排器只依赖 EventSink，不关心前端渲染方式。ChannelSink 走 mpsc 通道（控制台 / 其他前端消费），
//! RecordingSink 把事件记录在内存中，用于测试。

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::ui::UiEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

/// 通道接收端：前端关闭后事件被丢弃
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("ui receiver closed, event dropped");
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// 取出并清空已记录事件
    pub fn take(&self) -> Vec<UiEvent> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: UiEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
