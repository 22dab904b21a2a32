//! Calldata for the token and custody contract functions the saga calls.
//!
//! Only static argument types are needed (addresses and integers), so every
//! argument is a single 32-byte word after the 4-byte selector.

use sha3::{Digest, Keccak256};

use crate::ledger::models::Address;

pub const APPROVE: &str = "approve(address,uint256)";
pub const ALLOWANCE: &str = "allowance(address,address)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const DEPOSIT: &str = "deposit(uint256,uint32)";

const WORD: usize = 32;

/// First four bytes of the keccak256 hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode(signature: &str, words: &[[u8; WORD]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

pub fn encode_approve(spender: &Address, amount: u128) -> Vec<u8> {
    encode(APPROVE, &[address_word(spender), uint_word(amount)])
}

pub fn encode_allowance(owner: &Address, spender: &Address) -> Vec<u8> {
    encode(ALLOWANCE, &[address_word(owner), address_word(spender)])
}

pub fn encode_balance_of(owner: &Address) -> Vec<u8> {
    encode(BALANCE_OF, &[address_word(owner)])
}

pub fn encode_deposit(amount: u128, sub_account_selector: u32) -> Vec<u8> {
    encode(DEPOSIT, &[uint_word(amount), uint_word(sub_account_selector as u128)])
}

/// Decode a returned `uint256`, saturating at `u128::MAX`.
///
/// Unlimited approvals are commonly granted as `2^256 - 1`; saturating keeps
/// them comparable against any amount this service handles.
pub fn decode_uint(data: &[u8]) -> Option<u128> {
    if data.len() < WORD {
        return None;
    }

    let word = &data[..WORD];
    if word[..16].iter().any(|b| *b != 0) {
        return Some(u128::MAX);
    }

    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Some(u128::from_be_bytes(low))
}

/// Arguments of an encoded call, split into 32-byte words
pub fn call_words(data: &[u8]) -> Option<(&[u8], Vec<&[u8]>)> {
    if data.len() < 4 || (data.len() - 4) % WORD != 0 {
        return None;
    }
    let (selector, args) = data.split_at(4);
    Some((selector, args.chunks(WORD).collect()))
}

/// Address stored in an argument word
pub fn decode_address(word: &[u8]) -> Option<Address> {
    if word.len() != WORD || word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Some(Address::new(bytes))
}
