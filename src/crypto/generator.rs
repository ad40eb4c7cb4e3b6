//! Random display strings for the "generate a password" feature.
//!
//! These strings are shown to humans and never used as cipher keys, so
//! they are drawn from the thread-local RNG without any extra hardening.

use rand::Rng;

/// Longest string `generate` will produce. Longer requests are truncated.
pub const MAX_GENERATED_LENGTH: usize = 512;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SPECIAL_CHARACTERS: &[u8] = b"_-!?=()&%";

/// Generate a random string of `length` characters.
///
/// `length` is clamped to [`MAX_GENERATED_LENGTH`].  When
/// `special_characters` is set the alphabet also includes `_-!?=()&%`.
pub fn generate(length: usize, special_characters: bool) -> String {
    let length = length.min(MAX_GENERATED_LENGTH);

    let mut alphabet = LETTERS.to_vec();
    if special_characters {
        alphabet.extend_from_slice(SPECIAL_CHARACTERS);
    }

    let mut rng = rand::rng();
    (0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}
