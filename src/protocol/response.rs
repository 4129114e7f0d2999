use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::U16 as U16LE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// The payload of an OK packet (or, under `CLIENT_DEPRECATE_EOF`, a result-set-terminating
/// OK packet with header 0xFE), not yet parsed.
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

impl<'a> OkPayloadBytes<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct OkPayload {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
    pub info: String,
}

impl<'a> TryFrom<OkPayloadBytes<'a>> for OkPayload {
    type Error = Error;

    fn try_from(bytes: OkPayloadBytes<'a>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.bytes())?;
        if header != 0x00 && header != 0xFE {
            return Err(Error::protocol("expected OK packet header"));
        }

        let (affected_rows, data) = read_int_lenenc(data)?;
        let (last_insert_id, data) = read_int_lenenc(data)?;
        let (status_flags, data) = read_int_2(data)?;
        let (warnings, data) = read_int_2(data)?;
        let info = String::from_utf8_lossy(read_string_eof(data)).to_string();

        Ok(OkPayload {
            affected_rows,
            last_insert_id,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
            warnings,
            info,
        })
    }
}

/// The payload of an ERR packet, not yet parsed.
#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);

/// An ERR packet, parsed. This is also the `ServerError` variant body of [`crate::error::Error`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error_code} ({sql_state}): {message}")]
pub struct ErrPayload {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl<'a> TryFrom<ErrPayloadBytes<'a>> for ErrPayload {
    type Error = Error;

    fn try_from(bytes: ErrPayloadBytes<'a>) -> Result<Self> {
        let (header, data) = read_int_1(bytes.0)?;
        if header != 0xFF {
            return Err(Error::protocol("expected ERR packet header"));
        }

        let (error_code, data) = read_int_2(data)?;
        // marker is '#'
        let (_marker, data) = read_string_fix(data, 1)?;
        let (sql_state, data) = read_string_fix(data, 5)?;
        let message = String::from_utf8_lossy(read_string_eof(data)).to_string();

        Ok(ErrPayload {
            error_code,
            sql_state: String::from_utf8_lossy(sql_state).to_string(),
            message,
        })
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct EofPacket {
    warnings: U16LE,
    status_flags: U16LE,
}

impl EofPacket {
    pub fn warnings(&self) -> u16 {
        self.warnings.get()
    }

    pub fn status_flags(&self) -> ServerStatusFlags {
        ServerStatusFlags::from_bits_truncate(self.status_flags.get())
    }
}

/// Parses a legacy EOF packet: header 0xFE followed by `warnings` (u16) and `status_flags` (u16).
pub fn read_eof_packet(payload: &[u8]) -> Result<EofPacket> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::protocol("expected EOF packet header"));
    }
    if data.len() < 4 {
        return Err(Error::protocol("truncated EOF packet"));
    }
    Ok(*EofPacket::ref_from_bytes(&data[..4])
        .map_err(|_| Error::protocol("truncated EOF packet"))?)
}

/// Distinguishes the row/terminator ambiguity at the head of a result-set packet (§4.8):
/// a 0xFE header only means EOF/OK-terminator when the whole packet is shorter than 9
/// bytes, since a long row is free to start with a lenenc-string length byte of 0xFE.
pub fn is_eof_terminator(payload: &[u8]) -> bool {
    payload.first() == Some(&0xFE) && payload.len() < 9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ok_packet_example() {
        let bytes = [0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00];
        let ok = OkPayload::try_from(OkPayloadBytes(&bytes)).unwrap();
        assert_eq!(ok.affected_rows, 1);
        assert_eq!(ok.last_insert_id, 0);
        assert_eq!(ok.status_flags.bits(), 2);
        assert_eq!(ok.warnings, 0);
        assert_eq!(ok.info, "");
    }

    #[test]
    fn parses_err_packet_example() {
        let bytes = [
            0xFF, 0x30, 0x04, b'#', b'4', b'2', b'S', b'0', b'2', b'u', b'n', b'k', b'n', b'o',
            b'w', b'n',
        ];
        let err = ErrPayload::try_from(ErrPayloadBytes(&bytes)).unwrap();
        assert_eq!(err.error_code, 1072);
        assert_eq!(err.sql_state, "42S02");
        assert!(err.message.starts_with("unknown"));
    }

    #[test]
    fn eof_terminator_vs_long_row() {
        assert!(is_eof_terminator(&[0xFE, 0x00, 0x00, 0x00, 0x00]));
        let mut long_row = vec![0xFE];
        long_row.extend(std::iter::repeat(0u8).take(20));
        assert!(!is_eof_terminator(&long_row));
    }
}
