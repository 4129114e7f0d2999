//! The value codec (§4.7): converts between the wire's text/binary row encodings and
//! [`Value`], the abstract SQL value type shared by both protocols.

use std::borrow::Cow;
use std::str::FromStr;

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// A single column value, borrowing from the connection's read buffer where possible.
/// `String`/`Blob` carry a `Cow` so a borrowed [`Value`] can be promoted to an owned one
/// with [`Value::into_owned`] without changing variant shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Date {
        year: u16,
        month: u8,
        day: u8,
    },
    Datetime {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    },
    Time {
        negative: bool,
        days: u32,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
    },
    String(Cow<'a, [u8]>),
    Blob(Cow<'a, [u8]>),
}

/// Collations considered "binary" for the purpose of the text codec's string-vs-blob
/// distinction (§4.7); MySQL's `binary` collation id.
const BINARY_COLLATION: u16 = 63;

fn is_blob_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_GEOMETRY
    )
}

fn is_integer_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR
    )
}

fn is_temporal_date_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_NEWDATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2
    )
}

impl<'a> Value<'a> {
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Null => Value::Null,
            Value::Int64(v) => Value::Int64(v),
            Value::UInt64(v) => Value::UInt64(v),
            Value::Float(v) => Value::Float(v),
            Value::Double(v) => Value::Double(v),
            Value::Date { year, month, day } => Value::Date { year, month, day },
            Value::Datetime {
                year,
                month,
                day,
                hour,
                minute,
                second,
                microsecond,
            } => Value::Datetime {
                year,
                month,
                day,
                hour,
                minute,
                second,
                microsecond,
            },
            Value::Time {
                negative,
                days,
                hour,
                minute,
                second,
                microsecond,
            } => Value::Time {
                negative,
                days,
                hour,
                minute,
                second,
                microsecond,
            },
            Value::String(bytes) => Value::String(Cow::Owned(bytes.into_owned())),
            Value::Blob(bytes) => Value::Blob(Cow::Owned(bytes.into_owned())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    // ---- text codec (§4.7) ----

    /// Decodes one text-protocol field. `field` is `None` for a NULL field (the caller
    /// distinguishes NULL by the 0xFB marker byte before reaching here).
    pub fn decode_text(column_type: ColumnType, collation: u16, field: Option<&'a [u8]>) -> Result<Self> {
        let Some(bytes) = field else {
            return Ok(Value::Null);
        };
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::protocol("non-utf8 text-protocol field"))?;

        if is_integer_type(column_type) {
            if let Ok(v) = i64::from_str(text) {
                return Ok(Value::Int64(v));
            }
            let v = u64::from_str(text).map_err(|_| Error::protocol("invalid integer field"))?;
            return Ok(Value::UInt64(v));
        }
        match column_type {
            ColumnType::MYSQL_TYPE_FLOAT => {
                let v = f32::from_str(text).map_err(|_| Error::protocol("invalid float field"))?;
                Ok(Value::Float(v))
            }
            ColumnType::MYSQL_TYPE_DOUBLE => {
                let v = f64::from_str(text).map_err(|_| Error::protocol("invalid double field"))?;
                Ok(Value::Double(v))
            }
            ColumnType::MYSQL_TYPE_TIME => parse_text_time(text),
            _ if is_temporal_date_type(column_type) => parse_text_datetime(text, column_type),
            _ if is_blob_type(column_type) || collation == BINARY_COLLATION => {
                Ok(Value::Blob(Cow::Borrowed(bytes)))
            }
            _ => Ok(Value::String(Cow::Borrowed(bytes))),
        }
    }

    // ---- binary codec (§4.7) ----

    /// Decodes one binary-protocol field; `data` starts right after the null bitmap/the
    /// previous field and does not include the NULL bit (the caller checks that via
    /// [`NullBitmap`] before calling this).
    pub fn decode_binary(
        column_type: ColumnType,
        unsigned: bool,
        data: &'a [u8],
    ) -> Result<(Self, &'a [u8])> {
        use ColumnType::*;
        match column_type {
            MYSQL_TYPE_TINY => {
                let (v, rest) = read_int_1(data)?;
                Ok((
                    if unsigned {
                        Value::UInt64(v as u64)
                    } else {
                        Value::Int64(v as i8 as i64)
                    },
                    rest,
                ))
            }
            MYSQL_TYPE_SHORT | MYSQL_TYPE_YEAR => {
                let (v, rest) = read_int_2(data)?;
                Ok((
                    if unsigned {
                        Value::UInt64(v as u64)
                    } else {
                        Value::Int64(v as i16 as i64)
                    },
                    rest,
                ))
            }
            MYSQL_TYPE_LONG | MYSQL_TYPE_INT24 => {
                let (v, rest) = read_int_4(data)?;
                Ok((
                    if unsigned {
                        Value::UInt64(v as u64)
                    } else {
                        Value::Int64(v as i32 as i64)
                    },
                    rest,
                ))
            }
            MYSQL_TYPE_LONGLONG => {
                let (v, rest) = read_int_8(data)?;
                Ok((
                    if unsigned {
                        Value::UInt64(v)
                    } else {
                        Value::Int64(v as i64)
                    },
                    rest,
                ))
            }
            MYSQL_TYPE_FLOAT => {
                let (bits, rest) = read_int_4(data)?;
                Ok((Value::Float(f32::from_bits(bits)), rest))
            }
            MYSQL_TYPE_DOUBLE => {
                let (bits, rest) = read_int_8(data)?;
                Ok((Value::Double(f64::from_bits(bits)), rest))
            }
            _ if is_temporal_date_type(column_type) => decode_binary_datetime(data),
            MYSQL_TYPE_TIME | MYSQL_TYPE_TIME2 => decode_binary_time(data),
            _ => {
                let (bytes, rest) = read_string_lenenc(data)?;
                if is_blob_type(column_type) {
                    Ok((Value::Blob(Cow::Borrowed(bytes)), rest))
                } else {
                    Ok((Value::String(Cow::Borrowed(bytes)), rest))
                }
            }
        }
    }
}

fn decode_binary_datetime(data: &[u8]) -> Result<(Value<'_>, &[u8])> {
    let (len, data) = read_int_1(data)?;
    match len {
        0 => Ok((
            Value::Date {
                year: 0,
                month: 0,
                day: 0,
            },
            data,
        )),
        4 => {
            let (year, data) = read_int_2(data)?;
            let (month, data) = read_int_1(data)?;
            let (day, data) = read_int_1(data)?;
            Ok((
                Value::Date {
                    year,
                    month,
                    day,
                },
                data,
            ))
        }
        7 | 11 => {
            let (year, data) = read_int_2(data)?;
            let (month, data) = read_int_1(data)?;
            let (day, data) = read_int_1(data)?;
            let (hour, data) = read_int_1(data)?;
            let (minute, data) = read_int_1(data)?;
            let (second, data) = read_int_1(data)?;
            let (microsecond, data) = if len == 11 {
                read_int_4(data)?
            } else {
                (0, data)
            };
            Ok((
                Value::Datetime {
                    year,
                    month,
                    day,
                    hour,
                    minute,
                    second,
                    microsecond,
                },
                data,
            ))
        }
        _ => Err(Error::protocol("invalid DATE/DATETIME length byte")),
    }
}

fn decode_binary_time(data: &[u8]) -> Result<(Value<'_>, &[u8])> {
    let (len, data) = read_int_1(data)?;
    match len {
        0 => Ok((
            Value::Time {
                negative: false,
                days: 0,
                hour: 0,
                minute: 0,
                second: 0,
                microsecond: 0,
            },
            data,
        )),
        8 | 12 => {
            let (negative, data) = read_int_1(data)?;
            let (days, data) = read_int_4(data)?;
            let (hour, data) = read_int_1(data)?;
            let (minute, data) = read_int_1(data)?;
            let (second, data) = read_int_1(data)?;
            let (microsecond, data) = if len == 12 {
                read_int_4(data)?
            } else {
                (0, data)
            };
            Ok((
                Value::Time {
                    negative: negative != 0,
                    days,
                    hour,
                    minute,
                    second,
                    microsecond,
                },
                data,
            ))
        }
        _ => Err(Error::protocol("invalid TIME length byte")),
    }
}

fn parse_text_datetime(text: &str, column_type: ColumnType) -> Result<Value<'static>> {
    let bad = || Error::protocol("invalid date/datetime text field");
    let date_part = &text[..10.min(text.len())];
    if date_part.len() < 10 {
        return Err(bad());
    }
    let year: u16 = date_part[0..4].parse().map_err(|_| bad())?;
    let month: u8 = date_part[5..7].parse().map_err(|_| bad())?;
    let day: u8 = date_part[8..10].parse().map_err(|_| bad())?;

    if column_type == ColumnType::MYSQL_TYPE_DATE || text.len() == 10 {
        return Ok(Value::Date { year, month, day });
    }

    let time_part = text[11..].trim();
    let (hms, frac) = match time_part.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (time_part, ""),
    };
    let mut hms_parts = hms.split(':');
    let hour: u8 = hms_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute: u8 = hms_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let second: u8 = hms_parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let microsecond: u32 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<6}", &frac[..frac.len().min(6)]);
        padded.parse().map_err(|_| bad())?
    };

    Ok(Value::Datetime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        microsecond,
    })
}

fn parse_text_time(text: &str) -> Result<Value<'static>> {
    let bad = || Error::protocol("invalid time text field");
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (hms, frac) = match rest.split_once('.') {
        Some((hms, frac)) => (hms, frac),
        None => (rest, ""),
    };
    let mut parts = hms.split(':');
    let hours_total: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let minute: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let second: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let microsecond: u32 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{:0<6}", &frac[..frac.len().min(6)]);
        padded.parse().map_err(|_| bad())?
    };

    Ok(Value::Time {
        negative,
        days: hours_total / 24,
        hour: (hours_total % 24) as u8,
        minute,
        second,
        microsecond,
    })
}

/// The NULL bitmap preceding binary-protocol row values. Result-set rows offset bit
/// indices by 2 (the first two bits are reserved); statement-parameter bitmaps start at
/// bit 0 (§4.6, §4.8).
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> NullBitmap<'a> {
    pub fn for_result_set(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 2 }
    }

    pub fn for_parameters(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn is_null(&self, column_index: usize) -> bool {
        let bit = column_index + self.offset;
        let byte = bit / 8;
        let shift = bit % 8;
        self.bytes
            .get(byte)
            .map(|b| (b >> shift) & 1 != 0)
            .unwrap_or(false)
    }
}

/// Length in bytes of a NULL bitmap covering `num_columns` result-set columns (§4.8: the
/// `+2` offset is baked into the byte count, not just the bit indices).
pub fn result_set_null_bitmap_len(num_columns: usize) -> usize {
    (num_columns + 7 + 2) / 8
}

/// Length in bytes of a NULL bitmap covering `num_params` statement parameters (§4.6).
pub fn param_null_bitmap_len(num_params: usize) -> usize {
    num_params.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_binary_signed_and_unsigned() {
        let (v, rest) = Value::decode_binary(ColumnType::MYSQL_TYPE_TINY, false, &[0xFF]).unwrap();
        assert_eq!(v, Value::Int64(-1));
        assert!(rest.is_empty());

        let (v, _) = Value::decode_binary(ColumnType::MYSQL_TYPE_TINY, true, &[0xFF]).unwrap();
        assert_eq!(v, Value::UInt64(255));
    }

    #[test]
    fn decode_binary_date_example() {
        let bytes = [0x07, 0xE3, 0x07, 0x0A, 0x0B, 0x0C, 0x2D, 0x05];
        let (v, rest) = Value::decode_binary(ColumnType::MYSQL_TYPE_DATETIME, false, &bytes).unwrap();
        assert_eq!(
            v,
            Value::Datetime {
                year: 2019,
                month: 10,
                day: 11,
                hour: 12,
                minute: 45,
                second: 5,
                microsecond: 0,
            }
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_binary_string_and_blob() {
        let bytes = [0x03, b'f', b'o', b'o'];
        let (v, _) = Value::decode_binary(ColumnType::MYSQL_TYPE_VAR_STRING, false, &bytes).unwrap();
        assert_eq!(v, Value::String(Cow::Borrowed(b"foo")));

        let (v, _) = Value::decode_binary(ColumnType::MYSQL_TYPE_BLOB, false, &bytes).unwrap();
        assert_eq!(v, Value::Blob(Cow::Borrowed(b"foo")));
    }

    #[test]
    fn decode_text_integers_and_strings() {
        let v = Value::decode_text(ColumnType::MYSQL_TYPE_LONG, 33, Some(b"1")).unwrap();
        assert_eq!(v, Value::Int64(1));

        let v = Value::decode_text(ColumnType::MYSQL_TYPE_VAR_STRING, 33, Some(b"f0")).unwrap();
        assert_eq!(v, Value::String(Cow::Borrowed(b"f0")));

        let v = Value::decode_text(ColumnType::MYSQL_TYPE_LONG, 33, None).unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn decode_text_datetime() {
        let v = Value::decode_text(
            ColumnType::MYSQL_TYPE_DATETIME,
            33,
            Some(b"2019-10-11 12:45:05"),
        )
        .unwrap();
        assert_eq!(
            v,
            Value::Datetime {
                year: 2019,
                month: 10,
                day: 11,
                hour: 12,
                minute: 45,
                second: 5,
                microsecond: 0,
            }
        );
    }

    #[test]
    fn null_bitmap_offsets() {
        // bit layout for result set: column 0 -> bit 2, column 1 -> bit 3, ...
        let bitmap = NullBitmap::for_result_set(&[0b0000_1100]);
        assert!(bitmap.is_null(0));
        assert!(bitmap.is_null(1));
        assert!(!bitmap.is_null(2));

        let params = NullBitmap::for_parameters(&[0b0000_0001]);
        assert!(params.is_null(0));
        assert!(!params.is_null(1));
    }
}
