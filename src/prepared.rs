use crate::protocol::column_definition::FieldMetadata;

/// A prepared statement (§4.6): the server-assigned `statement_id` plus the parameter
/// and result-column metadata returned by `COM_STMT_PREPARE`.
///
/// `owner` ties the statement to the connection that created it (§3: "undefined
/// behavior if outlived by its connection's closure"); here that's detected and reported
/// as [`crate::error::Error::StatementClosed`] instead. Closing is explicit
/// (`Connection::close_statement`, for both the `sync` and `tokio` surfaces); further use
/// after close fails the same way rather than silently re-opening or panicking.
#[derive(Debug, Clone)]
pub struct PreparedStatement {
    pub(crate) statement_id: u32,
    pub(crate) owner: u64,
    pub(crate) params: Vec<FieldMetadata>,
    pub(crate) columns: Vec<FieldMetadata>,
    pub(crate) closed: bool,
}

impl PreparedStatement {
    pub fn statement_id(&self) -> u32 {
        self.statement_id
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn params(&self) -> &[FieldMetadata] {
        &self.params
    }

    pub fn columns(&self) -> &[FieldMetadata] {
        &self.columns
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
