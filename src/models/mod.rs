mod export_state;
mod post;
mod report;
pub mod timestamp;

pub use export_state::{ExportMode, ExportState};
pub use post::{
    AuthorActivity, IngestOutcome, IngestReport, NewPost, Post, SkippedPost, Stats,
    SubmoltActivity,
};
pub use report::{Publication, Report};
