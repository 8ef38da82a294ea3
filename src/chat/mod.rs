//! Chat line classification and the command-response pattern library.

pub mod classifier;
pub mod patterns;

pub use classifier::Classifier;
pub use patterns::{
    command_text, response_matcher, Announcement, AnnouncementRules, CommandFamily,
    CommandParams, ResponseMatcher,
};
