use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::column_definition::FieldMetadata;
use crate::protocol::primitive::*;
use crate::protocol::r#trait::params::Params;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes, OkPayloadBytes};
use crate::protocol::value::{NullBitmap, Value};
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// COM_STMT_PREPARE's OK response (§4.6).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

pub fn read_prepare_ok(payload: &[u8]) -> Result<PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    if status != 0x00 {
        return Err(ErrPayload::try_from(ErrPayloadBytes(payload))?.into());
    }
    if data.len() < 11 {
        return Err(Error::protocol("truncated COM_STMT_PREPARE response"));
    }
    Ok(*PrepareOk::ref_from_bytes(&data[..11])
        .map_err(|_| Error::protocol("malformed COM_STMT_PREPARE response"))?)
}

/// Writes COM_STMT_EXECUTE (§4.6): always with `CURSOR_TYPE_NO_CURSOR` and an iteration
/// count of 1, and always re-sending parameter types (no type-caching optimization).
pub fn write_execute<P: Params>(out: &mut Vec<u8>, statement_id: u32, params: &P) -> Result<()> {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);
    write_int_1(out, 0x00);
    write_int_4(out, 1);

    if params.len() > 0 {
        params.write_null_bitmap(out);
        write_int_1(out, 0x01);
        params.write_types(out);
        params.write_values(out)?;
    }
    Ok(())
}

pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Classifies the first packet of a COM_STMT_EXECUTE response; identical shape to
/// [`super::query::read_query_response`] except the result-set branch never carries a
/// LOCAL INFILE request.
pub fn read_execute_response(payload: &[u8]) -> Result<ExecuteResponse<'_>> {
    if payload.is_empty() {
        return Err(Error::protocol("empty COM_STMT_EXECUTE response"));
    }
    match payload[0] {
        0x00 => Ok(ExecuteResponse::Ok(OkPayloadBytes(payload))),
        0xFF => Err(ErrPayload::try_from(ErrPayloadBytes(payload))?.into()),
        _ => {
            let (column_count, _rest) = read_int_lenenc(payload)?;
            Ok(ExecuteResponse::ResultSet { column_count })
        }
    }
}

#[derive(Debug)]
pub enum ExecuteResponse<'a> {
    Ok(OkPayloadBytes<'a>),
    ResultSet { column_count: u64 },
}

/// Decodes one binary-protocol row (§4.8): a leading 0x00 packet-type byte, a NULL
/// bitmap (`offset = 2`), then one value per non-NULL column in column order.
pub fn read_binary_row<'a>(
    payload: &'a [u8],
    columns: &[FieldMetadata],
) -> Result<Vec<Value<'a>>> {
    let (packet_type, data) = read_int_1(payload)?;
    if packet_type != 0x00 {
        return Err(Error::protocol("expected binary row packet type 0x00"));
    }

    let bitmap_len = crate::protocol::value::result_set_null_bitmap_len(columns.len());
    if data.len() < bitmap_len {
        return Err(Error::protocol("truncated binary row NULL bitmap"));
    }
    let (bitmap_bytes, mut rest) = data.split_at(bitmap_len);
    let bitmap = NullBitmap::for_result_set(bitmap_bytes);

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        if bitmap.is_null(i) {
            values.push(Value::Null);
            continue;
        }
        let (value, remaining) =
            Value::decode_binary(column.column_type, column.is_unsigned(), rest)?;
        values.push(value);
        rest = remaining;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::ColumnType;

    fn int_column() -> FieldMetadata {
        FieldMetadata {
            catalog: "def".into(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: "n".into(),
            org_name: String::new(),
            character_set: 33,
            column_length: 11,
            column_type: ColumnType::MYSQL_TYPE_LONG,
            flags: crate::constant::ColumnFlags::empty(),
            decimals: 0,
        }
    }

    #[test]
    fn decodes_a_binary_row_with_one_null_and_one_int_column() {
        let col = int_column();
        let columns = vec![col.clone(), col];
        // bitmap covers 2 columns + offset 2 => 1 byte; column 0 null -> bit 2 set
        let mut payload = vec![0x00, 0b0000_0100];
        payload.extend_from_slice(&42i32.to_le_bytes());
        let values = read_binary_row(&payload, &columns).unwrap();
        assert_eq!(values[0], Value::Null);
        assert_eq!(values[1], Value::Int64(42));
    }
}
