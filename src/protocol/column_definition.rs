use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;

/// A column definition packet (§4.5, §4.6), fully owned so it can outlive the packet
/// buffer it was parsed from and be cached on a [`crate::PreparedStatement`].
#[derive(Debug, Clone)]
pub struct FieldMetadata {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub character_set: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

impl FieldMetadata {
    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (catalog, data) = read_string_lenenc(payload)?;
        let (schema, data) = read_string_lenenc(data)?;
        let (table, data) = read_string_lenenc(data)?;
        let (org_table, data) = read_string_lenenc(data)?;
        let (name, data) = read_string_lenenc(data)?;
        let (org_name, data) = read_string_lenenc(data)?;
        let (fixed_len, data) = read_int_lenenc(data)?;
        if fixed_len != 0x0C {
            return Err(Error::protocol("unexpected column definition fixed length field"));
        }
        let (character_set, data) = read_int_2(data)?;
        let (column_length, data) = read_int_4(data)?;
        let (type_byte, data) = read_int_1(data)?;
        let column_type = ColumnType::from_u8(type_byte)
            .ok_or_else(|| Error::protocol(format!("unknown column type 0x{:02X}", type_byte)))?;
        let (flags_bits, data) = read_int_2(data)?;
        let (decimals, _data) = read_int_1(data)?;

        Ok(FieldMetadata {
            catalog: String::from_utf8_lossy(catalog).to_string(),
            schema: String::from_utf8_lossy(schema).to_string(),
            table: String::from_utf8_lossy(table).to_string(),
            org_table: String::from_utf8_lossy(org_table).to_string(),
            name: String::from_utf8_lossy(name).to_string(),
            org_name: String::from_utf8_lossy(org_name).to_string(),
            character_set,
            column_length,
            column_type,
            flags: ColumnFlags::from_bits_truncate(flags_bits),
            decimals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::primitive::write_string_lenenc;

    #[test]
    fn parses_a_column_definition_packet() {
        let mut buf = Vec::new();
        write_string_lenenc(&mut buf, "def");
        write_string_lenenc(&mut buf, "test_schema");
        write_string_lenenc(&mut buf, "users");
        write_string_lenenc(&mut buf, "users");
        write_string_lenenc(&mut buf, "id");
        write_string_lenenc(&mut buf, "id");
        write_int_1(&mut buf, 0x0C);
        write_int_2(&mut buf, 33);
        write_int_4(&mut buf, 11);
        write_int_1(&mut buf, ColumnType::MYSQL_TYPE_LONG as u8);
        write_int_2(&mut buf, ColumnFlags::NOT_NULL_FLAG.bits() | ColumnFlags::PRI_KEY_FLAG.bits());
        write_int_1(&mut buf, 0);

        let field = FieldMetadata::parse(&buf).unwrap();
        assert_eq!(field.schema, "test_schema");
        assert_eq!(field.table, "users");
        assert_eq!(field.name, "id");
        assert_eq!(field.column_type, ColumnType::MYSQL_TYPE_LONG);
        assert!(field.flags.contains(ColumnFlags::PRI_KEY_FLAG));
        assert!(!field.is_unsigned());
    }
}
