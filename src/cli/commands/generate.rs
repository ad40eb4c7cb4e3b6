//! `emberdrop generate` — print a random string without starting the server.

use crate::crypto::{self, MAX_GENERATED_LENGTH};
use crate::cli::output;
use crate::errors::Result;

pub fn execute(length: usize, special: bool) -> Result<()> {
    if length > MAX_GENERATED_LENGTH {
        output::warning(&format!(
            "length {length} exceeds the maximum, using {MAX_GENERATED_LENGTH}"
        ));
    }
    println!("{}", crypto::generate(length, special));
    Ok(())
}
