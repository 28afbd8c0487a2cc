// src/ids.rs
//
// Event-id generation. Auto-generated ids are v4-style random 128-bit
// identifiers; slot ids additionally carry the application seed shift as
// a decimal suffix so replays across hosts stay collision-resistant
// under the shared seed scheme.

use rand::RngCore;

/// Hard cap on caller-supplied event ids.
pub const MAX_EVENT_ID_BYTES: usize = 256;

/// Format 128 random bits as a v4-style uuid (8-4-4-4-12 hex groups
/// with the version and variant nibbles set).
pub fn generate_event_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Auto-generated slot event id: uuid plus the decimal seed shift.
pub fn generate_suffixed_event_id(seed_shift: u64) -> String {
    format!("{}{}", generate_event_id(), seed_shift)
}

/// Validate a caller-supplied or generated event id.
pub fn validate_event_id(event_id: &str) -> Result<(), String> {
    if event_id.is_empty() {
        return Err("event id is empty".to_string());
    }
    if event_id.len() > MAX_EVENT_ID_BYTES {
        return Err(format!(
            "event id is {} bytes, limit is {MAX_EVENT_ID_BYTES}",
            event_id.len()
        ));
    }
    Ok(())
}
