use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// The number of characters in a one-time code.
pub const OTC_LENGTH: usize = 8;

/// Code alphabet without look-alike characters (0/O, 1/I).
const OTC_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a new random one-time code from the OS RNG.
///
/// # Returns
///
/// The code, wiped from memory when dropped.
pub fn generate_code() -> Zeroizing<String> {
    let mut code = Zeroizing::new(String::with_capacity(OTC_LENGTH));
    for _ in 0..OTC_LENGTH {
        let index = OsRng.gen_range(0..OTC_ALPHABET.len());
        code.push(char::from(OTC_ALPHABET[index]));
    }
    code
}

/// Normalizes user input: trims, uppercases, drops spaces and dashes.
pub fn normalize_code(raw: &str) -> Zeroizing<String> {
    Zeroizing::new(
        raw.chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect(),
    )
}

/// Returns the hex SHA-256 digest stored in place of the code.
pub fn hash_code(code: &str) -> String {
    let normalized = normalize_code(code);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_the_alphabet() {
        let code = generate_code();
        assert_eq!(code.len(), OTC_LENGTH);
        assert!(code.bytes().all(|b| OTC_ALPHABET.contains(&b)));
    }

    #[test]
    fn hash_ignores_case_and_separators() {
        assert_eq!(hash_code("abcd-efgh"), hash_code(" ABCDEFGH "));
        assert_ne!(hash_code("ABCDEFGH"), hash_code("ABCDEFGJ"));
        assert_eq!(hash_code("ABCDEFGH").len(), 64);
    }
}
