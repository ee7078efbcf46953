//! Relay path layout and validation.

use super::RelayError;
use crate::secret::RoomId;

/// Collection holding one child per room, each holding one child per request.
pub const REQUESTS_ROOT: &str = "requests";

/// Collection holding one push registration per room.
pub const REGISTRATIONS_ROOT: &str = "registrations";

/// Whether `segment` is a single legal path component.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Check that `path` is one or more legal segments joined by `/`.
pub fn validate_path(path: &str) -> Result<(), RelayError> {
    if path.split('/').all(is_valid_segment) {
        Ok(())
    } else {
        Err(RelayError::InvalidPath(path.to_string()))
    }
}

/// Check that `path` addresses a single room: `requests/{room}`,
/// `requests/{room}/{id}` or `registrations/{room}`.
///
/// Bare collection roots and deeper paths are refused so that nobody can
/// enumerate or wipe rooms without knowing their ids.
pub fn validate_room_path(path: &str) -> Result<(), RelayError> {
    validate_path(path)?;
    let segments: Vec<&str> = path.split('/').collect();
    match segments.as_slice() {
        [REQUESTS_ROOT, _] | [REQUESTS_ROOT, _, _] | [REGISTRATIONS_ROOT, _] => Ok(()),
        _ => Err(RelayError::InvalidPath(path.to_string())),
    }
}

pub fn room_requests_path(room: &RoomId) -> String {
    format!("{}/{}", REQUESTS_ROOT, room)
}

pub fn request_path(room: &RoomId, request_id: &str) -> String {
    format!("{}/{}/{}", REQUESTS_ROOT, room, request_id)
}

pub fn registration_path(room: &RoomId) -> String {
    format!("{}/{}", REGISTRATIONS_ROOT, room)
}
