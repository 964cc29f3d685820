mod classification;
mod cleanup;

pub use classification::{
    artifact_name, parse_classification, Classification, RetentionRule, UnknownClassification,
    LATEST_POINTER,
};
pub use cleanup::{cleanup, CleanupReport};
