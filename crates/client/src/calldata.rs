//! Minimal ABI calldata support for the registry's function surface.
//!
//! Only the shapes this tool actually calls are supported: static words
//! (`address`, `uint256`, `bytes32`) and single-level dynamic arrays of
//! them, plus decoding of the standard `Error(string)` revert payload.

use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

/// Selector of the solidity `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    #[error("calldata read past end (offset {offset}, length {len})")]
    OutOfBounds { offset: usize, len: usize },

    #[error("word does not fit target type: {value}")]
    ValueTooLarge { value: U256 },

    #[error("nested dynamic types are not supported")]
    UnsupportedNesting,
}

/// ABI value for a calldata argument.
#[derive(Debug, Clone)]
pub enum Value {
    Address(Address),
    Uint(U256),
    FixedBytes(H256),
    Array(Vec<Value>),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 4-byte function selector for a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Registry attribute keys are the keccak hash of the attribute name.
pub fn attribute_key(name: &str) -> H256 {
    H256(keccak256(name.as_bytes()))
}

pub fn encode_calldata(signature: &str, values: &[Value]) -> Result<Vec<u8>, AbiError> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_values(values)?);
    Ok(out)
}

fn encode_values(values: &[Value]) -> Result<Vec<u8>, AbiError> {
    let head_len = 32 * values.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for value in values {
        match value {
            Value::Array(items) => {
                let offset = head_len + tail.len();
                head.extend(U256::from(offset).to_big_endian());
                tail.extend(U256::from(items.len()).to_big_endian());
                for item in items {
                    tail.extend(encode_static_word(item)?);
                }
            }
            other => head.extend(encode_static_word(other)?),
        }
    }

    head.extend(tail);
    Ok(head)
}

fn encode_static_word(value: &Value) -> Result<[u8; 32], AbiError> {
    match value {
        Value::Address(address) => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(address.as_bytes());
            Ok(word)
        }
        Value::Uint(value) => Ok(value.to_big_endian()),
        Value::FixedBytes(bytes) => Ok(bytes.0),
        Value::Array(_) => Err(AbiError::UnsupportedNesting),
    }
}

fn word_at(data: &[u8], offset: usize) -> Result<[u8; 32], AbiError> {
    let end = offset
        .checked_add(32)
        .ok_or(AbiError::OutOfBounds { offset, len: data.len() })?;
    let slice = data.get(offset..end).ok_or(AbiError::OutOfBounds {
        offset,
        len: data.len(),
    })?;
    let mut word = [0u8; 32];
    word.copy_from_slice(slice);
    Ok(word)
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(&word_at(data, offset)?);
    if value > U256::from(usize::MAX) {
        return Err(AbiError::ValueTooLarge { value });
    }
    Ok(value.as_usize())
}

fn address_from_word(word: [u8; 32]) -> Address {
    Address::from_slice(&word[12..])
}

/// Decode a single `uint256` return word into a `u64`.
pub fn decode_u64(data: &[u8]) -> Result<u64, AbiError> {
    let value = U256::from_big_endian(&word_at(data, 0)?);
    if value > U256::from(u64::MAX) {
        return Err(AbiError::ValueTooLarge { value });
    }
    Ok(value.low_u64())
}

/// Decode a `bytes32[]` return value.
pub fn decode_bytes32_array(data: &[u8]) -> Result<Vec<H256>, AbiError> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    check_array_bounds(data, offset, len, 1)?;

    (0..len)
        .map(|i| word_at(data, offset + 32 + i * 32).map(H256))
        .collect()
}

/// Decode a `(bytes32 value, uint256 issuedAt, address issuer)[]` return
/// value into raw tuples.
pub fn decode_record_array(data: &[u8]) -> Result<Vec<(H256, U256, Address)>, AbiError> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    check_array_bounds(data, offset, len, 3)?;

    (0..len)
        .map(|i| {
            let base = offset + 32 + i * 96;
            let value = H256(word_at(data, base)?);
            let issued_at = U256::from_big_endian(&word_at(data, base + 32)?);
            let issuer = address_from_word(word_at(data, base + 64)?);
            Ok((value, issued_at, issuer))
        })
        .collect()
}

fn check_array_bounds(
    data: &[u8],
    offset: usize,
    len: usize,
    words_per_element: usize,
) -> Result<(), AbiError> {
    let bytes = len
        .checked_mul(32 * words_per_element)
        .and_then(|b| b.checked_add(offset))
        .and_then(|b| b.checked_add(32));
    match bytes {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(AbiError::OutOfBounds {
            offset,
            len: data.len(),
        }),
    }
}

/// Decode a standard `Error(string)` revert payload, if present.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(ERROR_STRING_SELECTOR.as_slice())?;
    let offset = usize_at(payload, 0).ok()?;
    let len = usize_at(payload, offset).ok()?;
    let start = offset.checked_add(32)?;
    let bytes = payload.get(start..start.checked_add(len)?)?;
    Some(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_string_selector_matches_keccak() {
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
    }

    #[test]
    fn attribute_keys_are_keccak_of_name() {
        assert_eq!(attribute_key("AML"), H256(keccak256(b"AML")));
        assert_ne!(attribute_key("AML"), attribute_key("COUNTRY"));
    }

    #[test]
    fn encodes_two_dynamic_arrays_with_correct_offsets() {
        let accounts = vec![
            Value::Address(Address::from_low_u64_be(0x11)),
            Value::Address(Address::from_low_u64_be(0x22)),
        ];
        let keys = vec![Value::FixedBytes(H256::from_low_u64_be(1))];

        let data = encode_calldata(
            "migrateAttributes(address[],bytes32[])",
            &[Value::Array(accounts), Value::Array(keys)],
        )
        .expect("encoding should succeed");

        assert_eq!(&data[..4], &selector("migrateAttributes(address[],bytes32[])"));
        let body = &data[4..];
        // head: offset of accounts array (0x40), offset of keys array
        // (0x40 + len word + 2 elements = 0xa0)
        assert_eq!(U256::from_big_endian(&body[0..32]), U256::from(0x40));
        assert_eq!(U256::from_big_endian(&body[32..64]), U256::from(0xa0));
        // accounts tail: length 2, then the two address words
        assert_eq!(U256::from_big_endian(&body[64..96]), U256::from(2));
        assert_eq!(body[96 + 31], 0x11);
        assert_eq!(body[128 + 31], 0x22);
        // keys tail: length 1, then the bytes32 word
        assert_eq!(U256::from_big_endian(&body[160..192]), U256::from(1));
        assert_eq!(body[192 + 31], 0x01);
        assert_eq!(body.len(), 224);
    }

    #[test]
    fn encodes_static_word_arguments_in_place() {
        let data = encode_calldata(
            "attributesBulk(address,bytes32[])",
            &[
                Value::Address(Address::from_low_u64_be(0xaa)),
                Value::Array(vec![Value::FixedBytes(H256::from_low_u64_be(7))]),
            ],
        )
        .expect("encoding should succeed");

        let body = &data[4..];
        assert_eq!(body[31], 0xaa);
        assert_eq!(U256::from_big_endian(&body[32..64]), U256::from(0x40));
        assert_eq!(U256::from_big_endian(&body[64..96]), U256::from(1));
    }

    #[test]
    fn rejects_nested_arrays() {
        let nested = Value::Array(vec![Value::Array(vec![])]);
        assert!(matches!(
            encode_calldata("f(bytes32[][])", &[nested]),
            Err(AbiError::UnsupportedNesting)
        ));
    }

    #[test]
    fn decodes_bytes32_array_roundtrip() {
        let keys: Vec<Value> = (1u64..=3)
            .map(|i| Value::FixedBytes(H256::from_low_u64_be(i)))
            .collect();
        let encoded = encode_values(&[Value::Array(keys)]).expect("encode");

        let decoded = decode_bytes32_array(&encoded).expect("decode");
        assert_eq!(
            decoded,
            vec![
                H256::from_low_u64_be(1),
                H256::from_low_u64_be(2),
                H256::from_low_u64_be(3)
            ]
        );
    }

    #[test]
    fn decodes_record_array() {
        // offset word, length word, one (bytes32, uint256, address) tuple
        let mut data = Vec::new();
        data.extend(U256::from(0x20).to_big_endian());
        data.extend(U256::from(1).to_big_endian());
        data.extend(H256::from_low_u64_be(0xbeef).0);
        data.extend(U256::from(1_700_000_000u64).to_big_endian());
        let mut issuer_word = [0u8; 32];
        issuer_word[12..].copy_from_slice(Address::from_low_u64_be(0x42).as_bytes());
        data.extend(issuer_word);

        let records = decode_record_array(&data).expect("decode");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, H256::from_low_u64_be(0xbeef));
        assert_eq!(records[0].1, U256::from(1_700_000_000u64));
        assert_eq!(records[0].2, Address::from_low_u64_be(0x42));
    }

    #[test]
    fn decodes_empty_record_array() {
        let mut data = Vec::new();
        data.extend(U256::from(0x20).to_big_endian());
        data.extend(U256::from(0).to_big_endian());
        assert_eq!(decode_record_array(&data).expect("decode"), vec![]);
    }

    #[test]
    fn truncated_array_is_out_of_bounds() {
        let mut data = Vec::new();
        data.extend(U256::from(0x20).to_big_endian());
        data.extend(U256::from(5).to_big_endian());
        // claims 5 elements but carries none
        assert!(matches!(
            decode_bytes32_array(&data),
            Err(AbiError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn decode_u64_rejects_oversized_words() {
        let word = U256::MAX.to_big_endian();
        assert!(matches!(
            decode_u64(&word),
            Err(AbiError::ValueTooLarge { .. })
        ));
        let word = U256::from(77u64).to_big_endian();
        assert_eq!(decode_u64(&word).expect("fits"), 77);
    }

    #[test]
    fn decodes_error_string_revert_payload() {
        let reason = "attribute set frozen";
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend(U256::from(0x20).to_big_endian());
        data.extend(U256::from(reason.len()).to_big_endian());
        let mut padded = reason.as_bytes().to_vec();
        padded.resize(32, 0);
        data.extend(padded);

        assert_eq!(decode_revert_reason(&data).as_deref(), Some(reason));
    }

    #[test]
    fn non_error_payload_has_no_reason() {
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef, 0x00]), None);
        assert_eq!(decode_revert_reason(&[]), None);
    }
}
