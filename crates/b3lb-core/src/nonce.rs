//! Random nonce generation for Meeting/RecordSet end-callback and upload
//! correlation tokens.

use rand::Rng;

const NONCE_CHAR_POOL: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@*(-_)";

pub fn generate_nonce(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..NONCE_CHAR_POOL.len());
            NONCE_CHAR_POOL[idx] as char
        })
        .collect()
}

/// Secret key material: 42 alphanumeric characters.
pub fn generate_secret() -> String {
    let pool = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..42)
        .map(|_| {
            let idx = rng.gen_range(0..pool.len());
            pool[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canned::NONCE_LENGTH;

    #[test]
    fn nonce_has_requested_length() {
        assert_eq!(generate_nonce(NONCE_LENGTH).len(), NONCE_LENGTH);
    }

    #[test]
    fn secret_is_42_chars() {
        assert_eq!(generate_secret().len(), 42);
    }

    #[test]
    fn nonces_are_not_trivially_constant() {
        let a = generate_nonce(NONCE_LENGTH);
        let b = generate_nonce(NONCE_LENGTH);
        assert_ne!(a, b);
    }
}
