//! Error classification for the retry-and-dispatch executor.
//!
//! Classification operates on the error's textual form because that is all
//! the backend gives us: transient conditions and dead connections are both
//! reported as opaque driver messages.

use crate::error::ReporsError;

/// Backend marker for an optimistic-concurrency conflict.
pub const ERR_NOT_COMMITTED: &str = "1020 - not_committed";
/// Backend marker for a stale-snapshot read.
pub const ERR_PAST_VERSION: &str = "1007 - past_version";
/// Backend marker for an in-progress schema change.
pub const ERR_ONLINE_DDL_IN_PROGRESS: &str = "Online DDL in progress for";

/// Returns true when the error is connection-level: either the typed
/// `Connection` variant, or backend text matching a refused TCP dial.
/// Any operation surfacing such an error must invalidate the rotator's
/// live connection before returning.
pub fn is_connection_error(err: &ReporsError) -> bool {
    if matches!(err, ReporsError::Connection(_)) {
        return true;
    }
    let message = err.to_string();
    message.starts_with("dial tcp ") && message.ends_with(": connection refused")
}

/// Returns true when the error is a transient backend condition that can
/// safely be retried until it succeeds.
pub fn is_retriable(err: &ReporsError) -> bool {
    let message = err.to_string();
    message.contains(ERR_NOT_COMMITTED)
        || message.contains(ERR_PAST_VERSION)
        || message.contains(ERR_ONLINE_DDL_IN_PROGRESS)
}
