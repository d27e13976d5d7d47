//! Identity generation.
//!
//! Node ids are deterministic (same session/segment always hashes to the same
//! id, so re-running an analyzer over the same transcript converges instead
//! of duplicating). Every other entity id is opaque and only needs to be
//! unique.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// ASCII unit separator. Used between hash inputs so no legal path or entry
/// id can forge a collision by shifting where one field ends and the next
/// begins.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Deterministic node id from the inputs that define a session segment.
///
/// Never derived from wall-clock time: the same `(session_file, segment)`
/// must always produce the same id, including across re-ingestion.
pub fn node_id(session_file: &str, segment_start: &str, segment_end: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_file.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(segment_start.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(segment_end.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// `true` if `id` matches the node-id shape (`^[a-f0-9]{16}$`).
pub fn is_valid_node_id(id: &str) -> bool {
    id.len() == 16 && id.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

fn opaque_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

/// Opaque lesson id (`les_<uuid>`).
pub fn lesson_id() -> String {
    opaque_id("les")
}

/// Opaque model-quirk id (`qrk_<uuid>`).
pub fn quirk_id() -> String {
    opaque_id("qrk")
}

/// Opaque tool-error id (`err_<uuid>`).
pub fn tool_error_id() -> String {
    opaque_id("err")
}

/// Opaque daemon-decision id (`dec_<uuid>`).
pub fn decision_id() -> String {
    opaque_id("dec")
}

/// Opaque edge id (`edg_<uuid>`).
pub fn edge_id() -> String {
    opaque_id("edg")
}

/// Minimal hex encoding so this module doesn't need the `hex` crate for a
/// one-line job; kept private to `id`.
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            s.push(nibble(b >> 4));
            s.push(nibble(b & 0x0f));
        }
        s
    }

    fn nibble(n: u8) -> char {
        match n {
            0..=9 => (b'0' + n) as char,
            _ => (b'a' + (n - 10)) as char,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_shaped() {
        let a = node_id("/sessions/s.jsonl", "e1", "e10");
        let b = node_id("/sessions/s.jsonl", "e1", "e10");
        assert_eq!(a, b);
        assert!(is_valid_node_id(&a), "id {a} did not match expected shape");
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn distinct_segments_differ() {
        let a = node_id("/sessions/s.jsonl", "e1", "e10");
        let b = node_id("/sessions/s.jsonl", "e11", "e20");
        assert_ne!(a, b);
    }

    #[test]
    fn separator_prevents_field_shift_collision() {
        let a = node_id("ab", "c", "d");
        let b = node_id("a", "bc", "d");
        assert_ne!(a, b);
    }

    #[test]
    fn opaque_ids_carry_their_prefix() {
        assert!(lesson_id().starts_with("les_"));
        assert!(quirk_id().starts_with("qrk_"));
        assert!(tool_error_id().starts_with("err_"));
        assert!(decision_id().starts_with("dec_"));
        assert!(edge_id().starts_with("edg_"));
    }
}
