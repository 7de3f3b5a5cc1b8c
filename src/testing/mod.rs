//! 测试替身
//!
//! 单元测试和 `tests/` 下的集成测试共用（后者通过 `test-support` 特性引入）。

pub mod fake_document;
pub mod site;

pub use fake_document::{first_expr, FakeDocument, FakeDom, FakeNode};
pub use site::{clip_site, fast_config, SiteCounters, SiteOptions};
