pub mod clip;
pub mod group;
pub mod loaders;
pub mod outcome;
pub mod report;
pub mod selector;

pub use clip::{convert_to_seconds, format_seconds, ClipDescriptor, Timecode};
pub use group::{group_by_target, total_clips, DescriptorGroup};
pub use loaders::{load_clips, ClipStatistics, LoadedClips};
pub use outcome::{ActionOutcome, ClipOutcome, ClipStage, ClipStatus, Verdict};
pub use report::{ItemReport, RunMode, RunReport};
pub use selector::{candidates, Selector, SelectorCandidate};
