//! Native account names: up to 12 base-32 symbols packed into a u64,
//! and the deterministic generator used when a fresh identity needs a
//! label nobody chose.

use std::fmt;
use std::str::FromStr;

use candid::CandidType;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::keccak::keccak256;

/// Symbol table indexed by the 5-bit value; `.` is padding only.
const SYMBOLS: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Alphabet the generator draws from (no padding symbol).
pub const NAME_ALPHABET: &[u8; 31] = b"12345abcdefghijklmnopqrstuvwxyz";

const NAME_LEN: usize = 12;

#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, CandidType, Deserialize, Serialize,
)]
pub struct AccountName(u64);

impl AccountName {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn from_value(value: u64) -> Self {
        AccountName(value)
    }
}

fn char_to_symbol(c: u8) -> Option<u64> {
    match c {
        b'.' => Some(0),
        b'1'..=b'5' => Some((c - b'1' + 1) as u64),
        b'a'..=b'z' => Some((c - b'a' + 6) as u64),
        _ => None,
    }
}

impl FromStr for AccountName {
    type Err = BridgeError;

    fn from_str(s: &str) -> BridgeResult<Self> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > NAME_LEN {
            return Err(BridgeError::InvalidName {
                value: s.to_string(),
            });
        }
        let mut value: u64 = 0;
        for i in 0..NAME_LEN {
            let symbol = if i < bytes.len() {
                char_to_symbol(bytes[i]).ok_or_else(|| BridgeError::InvalidName {
                    value: s.to_string(),
                })?
            } else {
                0
            };
            value = (value << 5) | symbol;
        }
        Ok(AccountName(value << 4))
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(NAME_LEN);
        for i in 0..NAME_LEN {
            let symbol = (self.0 >> (59 - 5 * i)) & 0x1f;
            out.push(SYMBOLS[symbol as usize] as char);
        }
        f.write_str(out.trim_end_matches('.'))
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Two-word counter PRNG (multiplier/increment advance, XSH-RR
/// output). Reproducibility is the requirement here, not secrecy.
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    pub fn from_entropy(entropy: &[u8]) -> Self {
        let digest = keccak256(entropy);
        let mut state = [0u8; 8];
        let mut inc = [0u8; 8];
        state.copy_from_slice(&digest[..8]);
        inc.copy_from_slice(&digest[8..16]);
        Pcg32 {
            state: u64::from_le_bytes(state),
            inc: u64::from_le_bytes(inc),
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old
            .wrapping_mul(6364136223846793005)
            .wrapping_add(self.inc | 1);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

/// Derives a 12-symbol account name from invocation entropy. Every
/// node evaluating the same operation draws the same entropy and so
/// lands on the same name.
pub fn generate_account_name(entropy: &[u8]) -> AccountName {
    let mut rng = Pcg32::from_entropy(entropy);
    let mut value: u64 = 0;
    for _ in 0..NAME_LEN {
        let index = (rng.next_u32() % NAME_ALPHABET.len() as u32) as u64;
        // alphabet index i is packed symbol i + 1 (no padding symbol)
        value = (value << 5) | (index + 1);
    }
    AccountName(value << 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_known_name() {
        let name: AccountName = "alice".parse().unwrap();
        assert_eq!(name.value(), 0x345c850000000000);
        assert_eq!(name.to_string(), "alice");
    }

    #[test]
    fn round_trips_names() {
        for text in ["a", "alice", "zzzzzzzzzzzz", "a.b.c", "12345"] {
            let name: AccountName = text.parse().unwrap();
            assert_eq!(name.to_string(), text);
        }
    }

    #[test]
    fn rejects_invalid_names() {
        for text in ["", "thirteenchars", "UPPER", "name0", "with space"] {
            assert!(matches!(
                text.parse::<AccountName>(),
                Err(BridgeError::InvalidName { .. }),
            ));
        }
    }

    #[test]
    fn generated_names_are_reproducible() {
        let entropy = [0x5au8; 40];
        let first = generate_account_name(&entropy);
        let second = generate_account_name(&entropy);
        assert_eq!(first, second);
    }

    #[test]
    fn generated_names_stay_inside_the_alphabet() {
        let label = generate_account_name(b"some entropy").to_string();
        assert_eq!(label.len(), 12);
        assert!(label.bytes().all(|c| NAME_ALPHABET.contains(&c)));
        // and the packed form parses back to itself
        let reparsed: AccountName = label.parse().unwrap();
        assert_eq!(reparsed.to_string(), label);
    }

    #[test]
    fn generator_output_is_a_pure_function_of_entropy() {
        let mut a = Pcg32::from_entropy(b"seed");
        let mut b = Pcg32::from_entropy(b"seed");
        for _ in 0..16 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }
}
