// Raffle View - Contract call encoding
//
// Only the handful of static types the raffle contracts expose are handled:
// address, uint (up to 128 bits of value), bool, string and address[].
use arrayref::{array_ref, array_refs};
use std::convert::TryFrom;
use tiny_keccak::{Hasher, Keccak};

use crate::error::RaffleClientError;
use crate::raffle_state::Address;

pub const WORD: usize = 32;

/// Argument for an encoded call
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Address(Address),
    Uint(u128),
    String(String),
}

/// keccak256 of an event signature, the log's first topic
pub fn event_topic(signature: &str) -> [u8; WORD] {
    let mut hasher = Keccak::v256();
    hasher.update(signature.as_bytes());
    let mut out = [0u8; WORD];
    hasher.finalize(&mut out);
    out
}

/// First four bytes of keccak256 of the function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = event_topic(signature);
    *array_ref![hash, 0, 4]
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&address.0);
    word
}

/// Encode `signature` and its arguments as call data
pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let head_len = args.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for arg in args {
        match arg {
            Token::Address(address) => head.extend_from_slice(&address_word(address)),
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::String(text) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                let bytes = text.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let padding = (WORD - bytes.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    let mut data = Vec::with_capacity(4 + head.len() + tail.len());
    data.extend_from_slice(&selector(signature));
    data.extend_from_slice(&head);
    data.extend_from_slice(&tail);
    data
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8; WORD], RaffleClientError> {
    if data.len() < offset.saturating_add(WORD) {
        return Err(RaffleClientError::Decode(format!(
            "need {} bytes at offset {}, have {}",
            WORD,
            offset,
            data.len()
        )));
    }
    Ok(array_ref![data, offset, WORD])
}

fn word_to_uint(word: &[u8; WORD]) -> Result<u128, RaffleClientError> {
    let (high, low) = array_refs![word, 16, 16];
    if high.iter().any(|b| *b != 0) {
        return Err(RaffleClientError::Decode("uint does not fit in 128 bits".to_string()));
    }
    Ok(u128::from_be_bytes(*low))
}

fn word_to_offset(word: &[u8; WORD]) -> Result<usize, RaffleClientError> {
    let value = word_to_uint(word)?;
    usize::try_from(value).map_err(|_| RaffleClientError::Decode(format!("offset {} too large", value)))
}

pub fn decode_uint(data: &[u8]) -> Result<u128, RaffleClientError> {
    word_to_uint(word_at(data, 0)?)
}

pub fn decode_u64(data: &[u8]) -> Result<u64, RaffleClientError> {
    let value = decode_uint(data)?;
    u64::try_from(value).map_err(|_| RaffleClientError::Decode(format!("{} does not fit in 64 bits", value)))
}

pub fn decode_bool(data: &[u8]) -> Result<bool, RaffleClientError> {
    Ok(decode_uint(data)? != 0)
}

pub fn decode_address(data: &[u8]) -> Result<Address, RaffleClientError> {
    let word = word_at(data, 0)?;
    let (_, address) = array_refs![word, 12, 20];
    Ok(Address(*address))
}

pub fn decode_string(data: &[u8]) -> Result<String, RaffleClientError> {
    let offset = word_to_offset(word_at(data, 0)?)?;
    let len = word_to_offset(word_at(data, offset)?)?;
    let start = offset + WORD;
    let bytes = data
        .get(start..start.saturating_add(len))
        .ok_or_else(|| RaffleClientError::Decode("string runs past end of data".to_string()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| RaffleClientError::Decode(e.to_string()))
}

pub fn decode_address_array(data: &[u8]) -> Result<Vec<Address>, RaffleClientError> {
    let offset = word_to_offset(word_at(data, 0)?)?;
    let len = word_to_offset(word_at(data, offset)?)?;
    let mut out = Vec::with_capacity(len.min(1024));
    for i in 0..len {
        let word = word_at(data, offset + WORD * (i + 1))?;
        let (_, address) = array_refs![word, 12, 20];
        out.push(Address(*address));
    }
    Ok(out)
}

/// "0x"-prefixed lowercase hex
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn from_hex(text: &str) -> Result<Vec<u8>, RaffleClientError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| RaffleClientError::Decode(format!("bad hex {:?}: {}", text, e)))
}
