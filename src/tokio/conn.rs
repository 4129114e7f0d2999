use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::instrument;

use crate::auth::AuthPlugin;
use crate::constant::{CapabilityFlags, ServerStatusFlags};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::prepared::PreparedStatement;
use crate::protocol::column_definition::FieldMetadata;
use crate::protocol::command::prepared::{
    ExecuteResponse, read_execute_response, read_prepare_ok, write_close_statement, write_execute,
    write_prepare,
};
use crate::protocol::command::query::{QueryResponse, read_query_response, write_query};
use crate::protocol::command::utility::write_quit;
use crate::protocol::handshake::{
    HandshakeResponse41, negotiate_capabilities, read_auth_switch_request,
    read_initial_handshake, write_auth_switch_response, write_handshake_response,
};
use crate::protocol::packet::{MAX_PAYLOAD_LEN, PacketHeader, frame_lengths};
use crate::protocol::r#trait::params::Params;
use crate::protocol::response::{ErrPayload, OkPayload, OkPayloadBytes, is_eof_terminator};
use crate::protocol::Codec;
use crate::row::{Row, owned_row};
use crate::tokio::stream::Stream;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// The cooperative-asynchronous counterpart of [`crate::sync::Connection`] (§5): same
/// protocol engine, same invariants, driven by an async runtime instead of blocking the
/// calling thread. The two never duplicate protocol logic — both drive the shared
/// `crate::protocol` codecs and state machines, differing only in how bytes move.
pub struct Connection {
    stream: Stream,
    read_buf: Vec<u8>,
    sequence_id: u8,
    id: u64,
    capability_flags: CapabilityFlags,
    server_version: String,
    connection_id: u32,
    collation: u8,
    poisoned: bool,
}

impl Connection {
    /// Opens a TCP or Unix-socket connection (per `opts.socket`) and runs the handshake
    /// (§4.4).
    #[instrument(skip_all)]
    pub async fn connect<O>(opts: O) -> Result<Self>
    where
        O: TryInto<Opts>,
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;

        let stream = if let Some(path) = &opts.socket {
            #[cfg(unix)]
            {
                Stream::unix(UnixStream::connect(path).await?)
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(Error::BadConfigError(
                    "unix sockets are not supported on this platform".to_string(),
                ));
            }
        } else {
            let host = opts
                .host
                .as_deref()
                .ok_or_else(|| Error::BadConfigError("missing host in connection options".to_string()))?;
            let tcp = TcpStream::connect((host, opts.port)).await?;
            tcp.set_nodelay(opts.tcp_nodelay)?;
            Stream::tcp(tcp)
        };

        Self::from_stream(stream, &opts).await
    }

    /// Runs the handshake (§4.4) over an already-connected stream. Exposed so tests can
    /// substitute a scripted mock transport (§9 design note).
    pub async fn from_stream(stream: Stream, opts: &Opts) -> Result<Self> {
        let mut conn = Self {
            stream,
            read_buf: Vec::new(),
            sequence_id: 0,
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            capability_flags: CapabilityFlags::empty(),
            server_version: String::new(),
            connection_id: 0,
            collation: opts.collation,
            poisoned: false,
        };
        conn.handshake(opts).await?;
        Ok(conn)
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn capability_flags(&self) -> CapabilityFlags {
        self.capability_flags
    }

    fn deprecate_eof(&self) -> bool {
        self.capability_flags.contains(CapabilityFlags::CLIENT_DEPRECATE_EOF)
    }

    fn check_poisoned(&self) -> Result<()> {
        if self.poisoned {
            return Err(Error::ConnectionPoisoned);
        }
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        if err.is_fatal() {
            self.poisoned = true;
        }
        err
    }

    // ---- packet channel (§4.1) ----
    //
    // Each suspension point here (one `await` per framed write, one per framed read) is
    // exactly the granularity §5 specifies: the task yields at transport boundaries only,
    // never mid-frame and never while holding anything beyond the connection's own state.

    fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let mut offset = 0;
        for len in frame_lengths(payload.len()) {
            let header = PacketHeader::encode(len, self.sequence_id).to_bytes();
            self.stream.write_all(&header).await?;
            self.stream.write_all(&payload[offset..offset + len]).await?;
            offset += len;
            self.sequence_id = self.sequence_id.wrapping_add(1);
        }
        self.stream.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<()> {
        self.read_buf.clear();
        loop {
            let mut header = [0u8; 4];
            self.stream.read_exact(&mut header).await?;
            let header = *PacketHeader::from_bytes(&header)?;
            if header.sequence_id() != self.sequence_id {
                return Err(Error::protocol(format!(
                    "sequence mismatch: expected {}, got {}",
                    self.sequence_id,
                    header.sequence_id()
                )));
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let len = header.length();
            let start = self.read_buf.len();
            self.read_buf.resize(start + len, 0);
            self.stream.read_exact(&mut self.read_buf[start..]).await?;

            if len < MAX_PAYLOAD_LEN {
                return Ok(());
            }
        }
    }

    /// Runs one client-initiated command cycle (§4.1): resets the sequence number,
    /// writes `payload`, and reads back one logical response packet.
    async fn command(&mut self, payload: &[u8]) -> Result<()> {
        self.check_poisoned()?;
        self.reset_sequence();
        self.send(payload).await.map_err(|e| self.fail(e))?;
        self.recv().await.map_err(|e| self.fail(e))?;
        Ok(())
    }

    async fn command_no_response(&mut self, payload: &[u8]) -> Result<()> {
        self.check_poisoned()?;
        self.reset_sequence();
        self.send(payload).await.map_err(|e| self.fail(e))
    }

    // ---- handshake engine (§4.4) ----

    #[instrument(skip_all)]
    async fn handshake(&mut self, opts: &Opts) -> Result<()> {
        self.read_buf.clear();
        self.sequence_id = 0;
        self.recv().await.map_err(|e| self.fail(e))?;

        let initial = read_initial_handshake(&self.read_buf).map_err(|e| self.fail(e))?;
        self.server_version = initial.server_version.clone();
        self.connection_id = initial.connection_id;
        self.capability_flags = negotiate_capabilities(initial.capability_flags, opts)
            .map_err(|e| self.fail(e))?;

        let mut plugin_name = initial.auth_plugin_name.to_vec();
        let mut challenge = initial.auth_plugin_data.clone();

        let auth_response = self.compute_auth_response(opts, &plugin_name, &challenge)?;

        self.send_handshake_response(opts, &plugin_name, &auth_response)
            .await
            .map_err(|e| self.fail(e))?;
        self.recv().await.map_err(|e| self.fail(e))?;

        loop {
            match self.read_buf.first() {
                Some(0x00) => return Ok(()),
                Some(0xFF) => {
                    let err = ErrPayload::try_from(crate::protocol::response::ErrPayloadBytes(
                        &self.read_buf,
                    ))
                    .map_err(|e| self.fail(e))?;
                    return Err(Error::ServerError(err));
                }
                Some(0xFE) => {
                    let switch = read_auth_switch_request(&self.read_buf).map_err(|e| self.fail(e))?;
                    plugin_name = switch.plugin_name.to_vec();
                    challenge = switch.plugin_data.to_vec();
                    let response = self.compute_auth_response(opts, &plugin_name, &challenge)?;
                    self.send(&write_auth_switch_response_bytes(&response))
                        .await
                        .map_err(|e| self.fail(e))?;
                    self.recv().await.map_err(|e| self.fail(e))?;
                }
                _ => {
                    return Err(self.fail(Error::protocol("unexpected packet during handshake")));
                }
            }
        }
    }

    fn compute_auth_response(
        &mut self,
        opts: &Opts,
        plugin_name: &[u8],
        challenge: &[u8],
    ) -> Result<Vec<u8>> {
        let plugin = opts.auth_plugins.find(plugin_name).ok_or_else(|| {
            self.fail(Error::AuthPluginUnsupported(
                String::from_utf8_lossy(plugin_name).to_string(),
            ))
        })?;
        let password = opts.password.as_deref().unwrap_or("");
        Ok(plugin.compute(password, challenge))
    }

    async fn send_handshake_response(
        &mut self,
        opts: &Opts,
        plugin_name: &[u8],
        auth_response: &[u8],
    ) -> Result<()> {
        let username = opts.user.clone();
        let db = opts.db.clone();
        let plugin_name = String::from_utf8_lossy(plugin_name).to_string();

        let mut payload = Vec::new();
        write_handshake_response(
            &mut payload,
            &HandshakeResponse41 {
                capability_flags: self.capability_flags,
                max_packet_size: 0x00FF_FFFF,
                charset: opts.collation,
                username: &username,
                auth_response,
                database: db.as_deref(),
                auth_plugin_name: Some(&plugin_name),
            },
        );
        self.send(&payload).await
    }

    // ---- query engine (§4.5) ----

    #[instrument(skip_all)]
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet<'_>> {
        let mut payload = Vec::new();
        write_query(&mut payload, sql);
        self.command(&payload).await?;

        match read_query_response(&self.read_buf).map_err(|e| self.fail(e))? {
            QueryResponse::Ok(ok_bytes) => {
                let ok = OkPayload::try_from(ok_bytes).map_err(|e| self.fail(e))?;
                Ok(ResultSet::complete_with_ok(self, Codec::Text, ok))
            }
            QueryResponse::ResultSet { column_count } => {
                let columns = self.read_field_definitions(column_count as u16).await?;
                Ok(ResultSet::streaming(self, Codec::Text, columns))
            }
        }
    }

    // ---- prepared-statement engine (§4.6) ----

    #[instrument(skip_all)]
    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        let mut payload = Vec::new();
        write_prepare(&mut payload, sql);
        self.command(&payload).await?;

        if self.read_buf.first() == Some(&0xFF) {
            let err = ErrPayload::try_from(crate::protocol::response::ErrPayloadBytes(
                &self.read_buf,
            ))
            .map_err(|e| self.fail(e))?;
            return Err(Error::ServerError(err));
        }

        let prepare_ok = read_prepare_ok(&self.read_buf).map_err(|e| self.fail(e))?;
        let statement_id = prepare_ok.statement_id();
        let num_params = prepare_ok.num_params();
        let num_columns = prepare_ok.num_columns();

        let params = self.read_field_definitions(num_params).await?;
        let columns = self.read_field_definitions(num_columns).await?;

        Ok(PreparedStatement {
            statement_id,
            owner: self.id,
            params,
            columns,
            closed: false,
        })
    }

    #[instrument(skip_all)]
    pub async fn execute<P: Params>(
        &mut self,
        stmt: &PreparedStatement,
        params: &P,
    ) -> Result<ResultSet<'_>> {
        if stmt.closed || stmt.owner != self.id {
            return Err(Error::StatementClosed);
        }
        if params.len() != stmt.num_params() {
            return Err(Error::WrongNumParams {
                expected: stmt.num_params(),
                actual: params.len(),
            });
        }

        let mut payload = Vec::new();
        write_execute(&mut payload, stmt.statement_id, params).map_err(|e| self.fail(e))?;
        self.command(&payload).await?;

        match read_execute_response(&self.read_buf).map_err(|e| self.fail(e))? {
            ExecuteResponse::Ok(ok_bytes) => {
                let ok = OkPayload::try_from(ok_bytes).map_err(|e| self.fail(e))?;
                Ok(ResultSet::complete_with_ok(self, Codec::Binary, ok))
            }
            ExecuteResponse::ResultSet { column_count } => {
                let columns = self.read_field_definitions(column_count as u16).await?;
                Ok(ResultSet::streaming(self, Codec::Binary, columns))
            }
        }
    }

    pub async fn close_statement(&mut self, stmt: &mut PreparedStatement) -> Result<()> {
        if stmt.owner != self.id {
            return Err(Error::StatementClosed);
        }
        if stmt.closed {
            return Ok(());
        }
        let mut payload = Vec::new();
        write_close_statement(&mut payload, stmt.statement_id);
        self.command_no_response(&payload).await?;
        stmt.closed = true;
        Ok(())
    }

    /// Sends `COM_QUIT` and consumes the connection; no response is expected (§6).
    pub async fn quit(mut self) -> Result<()> {
        let mut payload = Vec::new();
        write_quit(&mut payload);
        self.command_no_response(&payload).await
    }

    /// Reads `n` column/param-definition packets (§4.5, §4.6), consuming the trailing
    /// `EOF` marker unless `CLIENT_DEPRECATE_EOF` was negotiated.
    async fn read_field_definitions(&mut self, n: u16) -> Result<Vec<FieldMetadata>> {
        let mut fields = Vec::with_capacity(n as usize);
        for _ in 0..n {
            self.recv().await.map_err(|e| self.fail(e))?;
            fields.push(FieldMetadata::parse(&self.read_buf).map_err(|e| self.fail(e))?);
        }
        if n > 0 && !self.deprecate_eof() {
            self.recv().await.map_err(|e| self.fail(e))?;
        }
        Ok(fields)
    }
}

fn write_auth_switch_response_bytes(auth_data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_auth_switch_response(&mut out, auth_data);
    out
}

/// The async result-set state machine (§4.8), identical semantics to
/// [`crate::sync::ResultSet`]. Borrows `Connection` exclusively, which enforces "at most
/// one streaming result set per connection" (§3) at compile time.
pub struct ResultSet<'c> {
    conn: &'c mut Connection,
    columns: Vec<FieldMetadata>,
    codec: Codec,
    complete: bool,
    affected_rows: u64,
    last_insert_id: u64,
    warnings: u16,
    status_flags: ServerStatusFlags,
    info: String,
}

impl<'c> ResultSet<'c> {
    fn streaming(conn: &'c mut Connection, codec: Codec, columns: Vec<FieldMetadata>) -> Self {
        Self {
            conn,
            columns,
            codec,
            complete: false,
            affected_rows: 0,
            last_insert_id: 0,
            warnings: 0,
            status_flags: ServerStatusFlags::empty(),
            info: String::new(),
        }
    }

    fn complete_with_ok(conn: &'c mut Connection, codec: Codec, ok: OkPayload) -> Self {
        Self {
            conn,
            columns: Vec::new(),
            codec,
            complete: true,
            affected_rows: ok.affected_rows,
            last_insert_id: ok.last_insert_id,
            warnings: ok.warnings,
            status_flags: ok.status_flags,
            info: ok.info,
        }
    }

    pub fn columns(&self) -> &[FieldMetadata] {
        &self.columns
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    pub fn last_insert_id(&self) -> u64 {
        self.last_insert_id
    }

    pub fn warning_count(&self) -> u16 {
        self.warnings
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn status_flags(&self) -> ServerStatusFlags {
        self.status_flags
    }

    fn record_terminator(&mut self, payload: &[u8]) -> Result<()> {
        if self.conn.deprecate_eof() {
            let ok = OkPayload::try_from(OkPayloadBytes(payload)).map_err(|e| self.conn.fail(e))?;
            self.affected_rows = ok.affected_rows;
            self.last_insert_id = ok.last_insert_id;
            self.warnings = ok.warnings;
            self.status_flags = ok.status_flags;
            self.info = ok.info;
        } else {
            let eof = *crate::protocol::response::read_eof_packet(payload)
                .map_err(|e| self.conn.fail(e))?;
            self.warnings = eof.warnings();
            self.status_flags = eof.status_flags();
        }
        self.complete = true;
        Ok(())
    }

    /// Reads one row packet, returning `None` once the terminator has been consumed.
    /// Returns `Ok(None)` without I/O once `is_complete()` is true.
    pub async fn fetch_one(&mut self) -> Result<Option<Row<'_>>> {
        if self.complete {
            return Ok(None);
        }
        self.conn.recv().await.map_err(|e| self.conn.fail(e))?;
        let payload: &[u8] = &self.conn.read_buf;

        if payload.first() == Some(&0xFF) {
            let err = ErrPayload::try_from(crate::protocol::response::ErrPayloadBytes(payload))
                .map_err(|e| self.conn.fail(e))?;
            self.complete = true;
            return Err(Error::ServerError(err));
        }
        if is_eof_terminator(payload) {
            self.record_terminator(payload)?;
            return Ok(None);
        }

        let row = crate::protocol::row::decode_row(self.codec, &self.conn.read_buf, &self.columns)
            .map_err(|e| self.conn.fail(e))?;
        Ok(Some(row))
    }

    pub async fn fetch_many(&mut self, n: usize) -> Result<Vec<Row<'static>>> {
        let mut rows = Vec::with_capacity(n.min(1024));
        while rows.len() < n {
            match self.fetch_one().await? {
                Some(row) => rows.push(owned_row(row)),
                None => break,
            }
        }
        Ok(rows)
    }

    pub async fn fetch_all(&mut self) -> Result<Vec<Row<'static>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch_one().await? {
            rows.push(owned_row(row));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lengths_cover_spec_examples() {
        assert_eq!(frame_lengths(0xFFFFFF), vec![0xFFFFFF, 0]);
        assert_eq!(frame_lengths(0x1000000), vec![0xFFFFFF, 1]);
    }
}
