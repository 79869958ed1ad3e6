//! Client-side checks for topic names and topic filters.
//!
//! A broker rejects malformed topics by closing the connection (3.1.1) or with
//! a failure return code, so both are checked before anything hits the wire.

use thiserror::Error;

/// Maximum topic name/filter length in bytes (UTF-8 encoded).
pub const MAX_TOPIC_LENGTH: usize = 65_535;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("topic cannot be empty")]
    Empty,

    #[error("topic exceeds maximum length of {} bytes", MAX_TOPIC_LENGTH)]
    TooLong,

    #[error("topic cannot contain null character")]
    ContainsNullChar,

    #[error("wildcard characters (+, #) not allowed in topic names")]
    WildcardInTopicName,

    #[error("single-level wildcard (+) must occupy entire topic level")]
    InvalidSingleLevelWildcard,

    #[error("multi-level wildcard (#) must be the last level and occupy it entirely")]
    InvalidMultiLevelWildcard,
}

/// Check a topic name used for publishing.
///
/// ```
/// use tern_core::topic::check_topic_name;
///
/// assert!(check_topic_name("test/res").is_ok());
/// assert!(check_topic_name("test/+").is_err());
/// ```
pub fn check_topic_name(topic: &str) -> Result<(), TopicError> {
    check_common(topic)?;

    if topic.contains(['+', '#']) {
        return Err(TopicError::WildcardInTopicName);
    }

    Ok(())
}

/// Check a topic filter used for subscribing.
///
/// ```
/// use tern_core::topic::check_topic_filter;
///
/// assert!(check_topic_filter("test/res").is_ok());
/// assert!(check_topic_filter("test/#").is_ok());
/// assert!(check_topic_filter("test/#/res").is_err());
/// ```
pub fn check_topic_filter(filter: &str) -> Result<(), TopicError> {
    check_common(filter)?;

    let mut levels = filter.split('/').peekable();

    while let Some(level) = levels.next() {
        if level.contains('+') && level != "+" {
            return Err(TopicError::InvalidSingleLevelWildcard);
        }

        if level.contains('#') && (level != "#" || levels.peek().is_some()) {
            return Err(TopicError::InvalidMultiLevelWildcard);
        }
    }

    Ok(())
}

fn check_common(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }

    if topic.len() > MAX_TOPIC_LENGTH {
        return Err(TopicError::TooLong);
    }

    if topic.contains('\0') {
        return Err(TopicError::ContainsNullChar);
    }

    Ok(())
}
