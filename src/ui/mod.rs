//! UI 层：事件定义（event）、事件出口（sink）、终端前端（console）

pub mod console;
pub mod event;
pub mod sink;

pub use console::{format_event, run_console};
pub use event::{ConfirmKind, LogLevel, UiEvent};
pub use sink::{ChannelSink, EventSink, RecordingSink};
