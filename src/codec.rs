//! Encoding of `[key, value]` documents.
//!
//! A document is the JSON array `["<key>",<value>]`. Since the key is always written
//! first, the value can be cut out of a stored document once the length of the
//! encoded key is known, without parsing the value itself.

use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};

use crate::{error::Result, Error};

/// Serializes the pair `[key, value]`.
///
/// Fails with [`Error::TooLarge`] if the document is longer than `limit` bytes.
pub fn encode<V: Serialize + ?Sized>(key: &str, value: &V, limit: usize) -> Result<Vec<u8>> {
    let doc = serde_json::to_vec(&(key, value)).map_err(Error::Encode)?;
    if doc.len() > limit {
        return Err(Error::TooLarge {
            size: doc.len(),
            limit,
        });
    }
    Ok(doc)
}

/// Length of `key` inside a document, without the surrounding quotes.
pub fn key_len(key: &str) -> usize {
    key.chars()
        .map(|c| match c {
            '"' | '\\' | '\n' | '\t' | '\r' | '\u{08}' | '\u{0c}' => 2,
            c if (c as u32) < 0x20 => 6,
            c => c.len_utf8(),
        })
        .sum()
}

/// Returns the encoded value of a document whose key is `key_len` bytes long.
pub fn decode(doc: &[u8], key_len: usize) -> Result<&[u8]> {
    let start = key_len + 4;
    if doc.len() <= start
        || !doc.starts_with(b"[\"")
        || &doc[key_len + 2..start] != b"\","
    {
        return Err(Error::MalformedDocument);
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in doc.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' if depth > 0 => depth -= 1,
            b']' => {
                // closing bracket of the document itself
                return if i > start && i + 1 == doc.len() {
                    Ok(&doc[start..i])
                } else {
                    Err(Error::MalformedDocument)
                };
            }
            _ => {}
        }
    }
    Err(Error::MalformedDocument)
}

/// Reads the key of a document.
pub fn decode_key(doc: &[u8]) -> Result<String> {
    let (key, _): (String, IgnoredAny) = serde_json::from_slice(doc).map_err(Error::Decode)?;
    Ok(key)
}

/// Deserializes an encoded value.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(Error::Decode)
}

/// Deserializes an encoded value into an existing target.
pub fn decode_into<T: DeserializeOwned>(bytes: &[u8], target: &mut T) -> Result<()> {
    *target = decode_value(bytes)?;
    Ok(())
}

/// Joins encoded values into a single encoded array.
pub fn join<'a, I>(values: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut result = vec![b'['];
    for (i, v) in values.into_iter().enumerate() {
        if i > 0 {
            result.push(b',');
        }
        result.extend_from_slice(v);
    }
    result.push(b']');
    result
}
