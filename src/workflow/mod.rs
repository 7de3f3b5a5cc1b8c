pub mod clip_ctx;
pub mod clip_flow;
pub mod session;

pub use clip_ctx::ClipCtx;
pub use clip_flow::ClipFlow;
pub use session::{ResourceEntry, Session, SessionPhase, SessionState, UiContext};
