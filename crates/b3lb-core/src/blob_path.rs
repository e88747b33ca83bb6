//! Derives the directory hierarchy a RecordSet's blob is stored under.
//!
//! Path is `<p1>/<p2>/.../<pD>/<tail>/` where each `pN` is a fixed-width
//! chunk of the UUID's base32 encoding, width * depth kept under 26 so the
//! hierarchy never exhausts the 128-bit UUID's encoded length.

use uuid::Uuid;

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits_in_buffer = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits_in_buffer += 8;
        while bits_in_buffer >= 5 {
            bits_in_buffer -= 5;
            let index = (buffer >> bits_in_buffer) & 0x1F;
            out.push(ALPHABET[index as usize] as char);
        }
    }

    if bits_in_buffer > 0 {
        let index = (buffer << (5 - bits_in_buffer)) & 0x1F;
        out.push(ALPHABET[index as usize] as char);
    }

    out
}

/// Splits a UUID's base32 encoding into `depth` chunks of `width`
/// characters each, followed by whatever is left as the tail directory.
pub fn hierarchy_path(uuid: &Uuid, width: usize, depth: usize) -> String {
    let encoded = base32_encode(uuid.as_bytes());
    let chars: Vec<char> = encoded.chars().collect();

    let mut segments = Vec::with_capacity(depth + 1);
    let mut cursor = 0usize;
    for _ in 0..depth {
        let end = (cursor + width).min(chars.len());
        segments.push(chars[cursor..end].iter().collect::<String>());
        cursor = end;
    }
    let tail: String = chars[cursor..].iter().collect();
    segments.push(tail);

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_has_requested_depth_plus_tail() {
        let id = Uuid::parse_str("123e4567-e89b-12d3-a456-426614174000").unwrap();
        let path = hierarchy_path(&id, 2, 3);
        let segments: Vec<&str> = path.split('/').collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 2);
        assert_eq!(segments[2].len(), 2);
        assert!(!segments[3].is_empty());
    }

    #[test]
    fn deterministic_for_same_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(hierarchy_path(&id, 2, 3), hierarchy_path(&id, 2, 3));
    }
}
