pub mod csv_loader;

pub use csv_loader::{load_clips, parse_clips, ClipStatistics, LoadedClips, RejectReason, RejectedRow};
