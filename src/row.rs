use crate::protocol::Value;

/// A fetched row: one [`Value`] per column, in column order. Borrows from the
/// connection's read buffer when returned by `fetch_one` (valid until the next fetch);
/// `fetch_many`/`fetch_all` promote each value to `'static` with [`Value::into_owned`].
pub type Row<'a> = Vec<Value<'a>>;

pub(crate) fn owned_row(row: Row<'_>) -> Row<'static> {
    row.into_iter().map(Value::into_owned).collect()
}
