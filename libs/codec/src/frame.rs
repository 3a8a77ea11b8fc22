//! Self-describing integer frames
//!
//! Handshake and control values travel as 8-byte frames:
//!
//! ```text
//! ┌─────┬─────┬──────────────────────┬─────┬─────┐
//! │ 'Y' │ 'A' │ i32, network order   │ 'R' │ 'P' │
//! └─────┴─────┴──────────────────────┴─────┴─────┘
//! ```
//!
//! The magic bytes let a receiver reject a frame that was never one, which
//! is also how binary carrier headers stay distinguishable from text ones.

/// Length of an integer frame in bytes
pub const FRAME_LEN: usize = 8;

/// Value reported by [`interpret_yarp_number`] when the magic does not match
pub const INVALID_FRAME: i32 = -1;

/// Encode `value` as an 8-byte integer frame
pub fn create_yarp_number(value: i32) -> [u8; FRAME_LEN] {
    let be = value.to_be_bytes();
    [b'Y', b'A', be[0], be[1], be[2], be[3], b'R', b'P']
}

/// Decode an integer frame, returning `-1` on length or magic mismatch
pub fn interpret_yarp_number(frame: &[u8]) -> i32 {
    if frame.len() != FRAME_LEN {
        return INVALID_FRAME;
    }
    if frame[0] != b'Y' || frame[1] != b'A' || frame[6] != b'R' || frame[7] != b'P' {
        return INVALID_FRAME;
    }
    i32::from_be_bytes([frame[2], frame[3], frame[4], frame[5]])
}
