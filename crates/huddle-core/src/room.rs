//! Room identifiers.
//!
//! A room here is only a live broadcast group: the set of connections that
//! joined it. Durable membership belongs to the chat store.

/// Maximum room id length.
pub const MAX_ROOM_ID_LENGTH: usize = 256;

/// A room identifier.
pub type RoomId = String;

/// Validate a room id taken from a client payload.
///
/// # Errors
///
/// Returns an error message if the room id is unusable.
pub fn validate_room_id(room_id: &str) -> Result<(), &'static str> {
    if room_id.is_empty() {
        return Err("Room id cannot be empty");
    }
    if room_id.len() > MAX_ROOM_ID_LENGTH {
        return Err("Room id too long");
    }
    if room_id.chars().any(char::is_control) {
        return Err("Room id contains control characters");
    }
    Ok(())
}
