//! Row decoding shared between the text (§4.5) and binary (§4.6) result-set protocols.
//! The `sync` and `tokio` connection engines each drive their own I/O loop but both
//! decode rows through [`decode_row`], so the two codecs are implemented exactly once.

use crate::error::Result;
use crate::protocol::column_definition::FieldMetadata;
use crate::protocol::command::prepared::read_binary_row;
use crate::protocol::primitive::read_string_lenenc;
use crate::protocol::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Text,
    Binary,
}

pub fn decode_row<'a>(
    codec: Codec,
    payload: &'a [u8],
    columns: &[FieldMetadata],
) -> Result<Vec<Value<'a>>> {
    match codec {
        Codec::Binary => read_binary_row(payload, columns),
        Codec::Text => decode_text_row(payload, columns),
    }
}

/// The text protocol (§4.7): each column is a lenenc-string, or a single `0xFB` byte for
/// NULL in place of the length prefix.
fn decode_text_row<'a>(payload: &'a [u8], columns: &[FieldMetadata]) -> Result<Vec<Value<'a>>> {
    let mut rest = payload;
    let mut values = Vec::with_capacity(columns.len());
    for column in columns {
        if rest.first() == Some(&0xFB) {
            values.push(Value::Null);
            rest = &rest[1..];
            continue;
        }
        let (field, remaining) = read_string_lenenc(rest)?;
        values.push(Value::decode_text(
            column.column_type,
            column.character_set,
            Some(field),
        )?);
        rest = remaining;
    }
    Ok(values)
}
