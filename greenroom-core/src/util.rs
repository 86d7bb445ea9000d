use lazy_static::lazy_static;
use rand::{thread_rng, RngCore};
use regex::Regex;
use std::fmt::Write;

/// Length of a capability token in hex characters (256 bits)
pub const CAPABILITY_TOKEN_LEN: usize = 64;

lazy_static! {
    static ref CAPABILITY_TOKEN_REGEX: Regex =
        Regex::new("^[a-f0-9]{64}$").expect("capability token regex compiles");
}

/// Generates a random lowercase hex string of `bytes * 2` characters
pub fn random_hex_string(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    thread_rng().fill_bytes(&mut buf);

    buf.iter().fold(String::with_capacity(bytes * 2), |mut s, b| {
        write!(s, "{b:02x}").expect("writing to a string succeeds");
        s
    })
}

/// Generates a fresh capability token
pub fn random_capability_token() -> String {
    random_hex_string(CAPABILITY_TOKEN_LEN / 2)
}

/// Checks the fixed 64-lowercase-hex shape of a capability token, so malformed
/// input is rejected before any store access
pub fn is_valid_capability_token(token: &str) -> bool {
    CAPABILITY_TOKEN_REGEX.is_match(token)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_tokens_are_well_formed() {
        let token = random_capability_token();

        assert_eq!(token.len(), CAPABILITY_TOKEN_LEN);
        assert!(is_valid_capability_token(&token));
    }

    #[test]
    fn validation_rejects_malformed_tokens() {
        // Wrong length
        assert!(!is_valid_capability_token(""));
        assert!(!is_valid_capability_token(&"a".repeat(63)));
        assert!(!is_valid_capability_token(&"a".repeat(65)));

        // Non-hex characters
        assert!(!is_valid_capability_token(&"g".repeat(64)));
        assert!(!is_valid_capability_token(&"-".repeat(64)));

        // Uppercase hex is not accepted
        assert!(!is_valid_capability_token(&"A".repeat(64)));

        assert!(is_valid_capability_token(&"0f".repeat(32)));
    }
}
