//! 基础设施层
//!
//! 持有稀缺资源（Page），对上只暴露 `LiveDocument` 能力

pub mod document;
pub mod dom_scripts;
pub mod js_executor;

pub use document::{DocResult, ElementHandle, ElementScope, LiveDocument};
pub use js_executor::JsExecutor;
