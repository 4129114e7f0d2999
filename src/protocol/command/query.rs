use crate::constant::CommandByte;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayloadBytes};

/// Writes COM_QUERY (§4.5): the command byte followed by the raw SQL text.
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Classifies the first packet of a COM_QUERY response (§4.5):
/// - 0xFF: ERR packet
/// - 0x00: OK packet, no result set
/// - 0xFB: LOCAL INFILE request, rejected outright (out of scope)
/// - otherwise: a result set header whose first field is the lenenc column count
pub fn read_query_response(payload: &[u8]) -> Result<QueryResponse<'_>> {
    if payload.is_empty() {
        return Err(Error::protocol("empty COM_QUERY response"));
    }

    match payload[0] {
        0xFF => Err(ErrPayload::try_from(ErrPayloadBytes(payload))?.into()),
        0x00 => Ok(QueryResponse::Ok(OkPayloadBytes(payload))),
        0xFB => Err(Error::LocalInfileUnsupported),
        _ => {
            let (column_count, _rest) = read_int_lenenc(payload)?;
            Ok(QueryResponse::ResultSet { column_count })
        }
    }
}

use crate::protocol::response::ErrPayload;

#[derive(Debug)]
pub enum QueryResponse<'a> {
    Ok(OkPayloadBytes<'a>),
    ResultSet { column_count: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ok_response() {
        let bytes = [0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00];
        match read_query_response(&bytes).unwrap() {
            QueryResponse::Ok(_) => {}
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn classifies_result_set_header() {
        let bytes = [0x02];
        match read_query_response(&bytes).unwrap() {
            QueryResponse::ResultSet { column_count } => assert_eq!(column_count, 2),
            _ => panic!("expected ResultSet"),
        }
    }

    #[test]
    fn rejects_local_infile() {
        let bytes = [0xFB, b'/', b't', b'm', b'p'];
        assert!(matches!(
            read_query_response(&bytes),
            Err(Error::LocalInfileUnsupported)
        ));
    }
}
