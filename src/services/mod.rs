pub mod actuator;
pub mod artifact_downloader;
pub mod file_naming;
pub mod locator;
pub mod report_writer;

pub use actuator::{Action, Actuator};
pub use artifact_downloader::ArtifactDownloader;
pub use locator::Locator;
pub use report_writer::ReportWriter;
