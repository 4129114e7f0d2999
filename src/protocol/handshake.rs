use crate::constant::{CAPABILITIES_ALWAYS_ENABLED, CAPABILITIES_CONFIGURABLE, CapabilityFlags};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes};

/// Computes the client capability set for the handshake response (§4.4 step 2): the
/// fixed always-enabled set, plus the caller's requested extras filtered through
/// `CAPABILITIES_CONFIGURABLE`, plus `CLIENT_CONNECT_WITH_DB` iff a database was given,
/// all intersected with what the server actually advertises. Fails if the server lacks
/// `PROTOCOL_41` or `SECURE_CONNECTION`, since the rest of this engine assumes both.
pub fn negotiate_capabilities(
    server_flags: CapabilityFlags,
    opts: &Opts,
) -> Result<CapabilityFlags> {
    if !server_flags.contains(CapabilityFlags::CLIENT_PROTOCOL_41) {
        return Err(Error::HandshakeIncompatible(
            "server does not support CLIENT_PROTOCOL_41".to_string(),
        ));
    }
    if !server_flags.contains(CapabilityFlags::CLIENT_SECURE_CONNECTION) {
        return Err(Error::HandshakeIncompatible(
            "server does not support CLIENT_SECURE_CONNECTION".to_string(),
        ));
    }

    let mut wanted = CAPABILITIES_ALWAYS_ENABLED | (opts.capabilities_extra & CAPABILITIES_CONFIGURABLE);
    if opts.db.is_some() {
        wanted |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
    }

    Ok(server_flags & wanted)
}

// ============================================================================
// Initial Handshake Packet (Server -> Client)
// ============================================================================

/// Initial handshake packet from server (Protocol::HandshakeV10)
///
/// Packet format:
/// ```text
/// 1   [0a] protocol version (always 10)
/// n   server version (null-terminated string)
/// 4   connection id
/// 8   auth-plugin-data-part-1 (first 8 bytes of challenge)
/// 1   [00] filler
/// 2   capability flags (lower 2 bytes)
/// 1   character set
/// 2   status flags
/// 2   capability flags (upper 2 bytes)
/// 1   auth plugin data length
/// 10  reserved (all 0x00)
/// n   auth-plugin-data-part-2 (remaining challenge bytes)
/// n   auth plugin name (null-terminated)
/// ```
#[derive(Debug, Clone)]
pub struct InitialHandshake<'a> {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin_name: &'a [u8],
}

pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake<'_>> {
    let (protocol_version, data) = read_int_1(payload)?;

    if protocol_version == 0xFF {
        let err = ErrPayload::try_from(ErrPayloadBytes(payload))?;
        return Err(Error::ServerError(err));
    }
    if protocol_version != 0x0A {
        return Err(Error::HandshakeIncompatible(format!(
            "unsupported handshake protocol version {}",
            protocol_version
        )));
    }

    let (server_version_bytes, data) = read_string_null(data)?;
    let server_version = String::from_utf8_lossy(server_version_bytes).to_string();

    let (connection_id, data) = read_int_4(data)?;
    let (auth_data_1, data) = read_string_fix(data, 8)?;
    let (_filler, data) = read_int_1(data)?;
    let (cap_lower, data) = read_int_2(data)?;
    let (charset, data) = read_int_1(data)?;
    let (status_flags, data) = read_int_2(data)?;
    let (cap_upper, data) = read_int_2(data)?;

    let cap_bits = ((cap_upper as u32) << 16) | (cap_lower as u32);
    let capability_flags = CapabilityFlags::from_bits_truncate(cap_bits);

    let (auth_data_len, data) = read_int_1(data)?;
    let (_reserved, data) = read_string_fix(data, 10)?;

    let auth_data_2_len = (auth_data_len as usize).saturating_sub(8).max(13) - 1;
    let (auth_data_2, data) = read_string_fix(data, auth_data_2_len)?;
    let (_null_terminator, data) = read_int_1(data)?;

    let mut auth_plugin_data = Vec::with_capacity(auth_data_1.len() + auth_data_2.len());
    auth_plugin_data.extend_from_slice(auth_data_1);
    auth_plugin_data.extend_from_slice(auth_data_2);

    let (auth_plugin_name, _data) = read_string_null(data)?;

    Ok(InitialHandshake {
        protocol_version,
        server_version,
        connection_id,
        auth_plugin_data,
        capability_flags,
        charset,
        status_flags,
        auth_plugin_name,
    })
}

// ============================================================================
// Handshake Response Packet (Client -> Server)
// ============================================================================

/// HandshakeResponse41, sent by the client after receiving [`InitialHandshake`].
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
    pub auth_plugin_name: Option<&'a str>,
}

pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41) {
    write_int_4(out, response.capability_flags.bits());
    write_int_4(out, response.max_packet_size);
    write_int_1(out, response.charset);
    out.extend_from_slice(&[0u8; 23]);
    write_string_null(out, response.username);

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA)
    {
        write_bytes_lenenc(out, response.auth_response);
    } else {
        write_int_1(out, response.auth_response.len() as u8);
        out.extend_from_slice(response.auth_response);
    }

    if let Some(db) = response.database {
        write_string_null(out, db);
    }

    if response
        .capability_flags
        .contains(CapabilityFlags::CLIENT_PLUGIN_AUTH)
    {
        if let Some(plugin) = response.auth_plugin_name {
            write_string_null(out, plugin);
        }
    }
}

// ============================================================================
// Auth Switch Request Packet (Server -> Client)
// ============================================================================

/// Sent by the server when it wants a different authentication plugin than the one
/// named in [`InitialHandshake::auth_plugin_name`] (§4.3).
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest<'a> {
    pub plugin_name: &'a [u8],
    pub plugin_data: &'a [u8],
}

pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest<'_>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::protocol("expected auth switch request header"));
    }

    let (plugin_name, data) = read_string_null(data)?;

    // Plugin data is conventionally null-terminated here, though the spec doesn't
    // require it; strip a single trailing zero byte if present.
    let plugin_data = match data.split_last() {
        Some((0, rest)) => rest,
        _ => data,
    };

    Ok(AuthSwitchRequest {
        plugin_name,
        plugin_data,
    })
}

pub fn write_auth_switch_response(out: &mut Vec<u8>, auth_data: &[u8]) {
    out.extend_from_slice(auth_data);
}

// ============================================================================
// Authentication Plugins
// ============================================================================

pub const MYSQL_NATIVE_PASSWORD: &[u8] = b"mysql_native_password";

/// `mysql_native_password`: `SHA1(password) XOR SHA1(challenge || SHA1(SHA1(password)))`.
/// An empty password yields an empty response (§4.3), not 20 zero bytes.
/// caching_sha2_password and other newer plugins are out of scope; the connection
/// rejects them with [`Error::AuthPluginUnsupported`].
pub fn auth_mysql_native_password(password: &str, challenge: &[u8]) -> Vec<u8> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return Vec::new();
    }

    let stage1_hash = Sha1::digest(password.as_bytes());
    let stage2_hash = Sha1::digest(stage1_hash);

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2_hash);
    let token_hash = hasher.finalize();

    let mut result = vec![0u8; 20];
    for i in 0..20 {
        result[i] = stage1_hash[i] ^ token_hash[i];
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_password_is_deterministic_and_nonzero_for_nonempty_password() {
        let challenge = b"01234567890123456789";
        let a = auth_mysql_native_password("hunter2", challenge);
        let b = auth_mysql_native_password("hunter2", challenge);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
        assert_ne!(a, vec![0u8; 20]);
    }

    #[test]
    fn native_password_empty_password_is_empty() {
        let challenge = b"01234567890123456789";
        assert_eq!(auth_mysql_native_password("", challenge), Vec::<u8>::new());
    }

    #[test]
    fn native_password_matches_known_vector() {
        // password = "p@ssw0rd", challenge = 20 bytes 0x01..0x14 (§8 scenario).
        let challenge: Vec<u8> = (1..=20).collect();
        let response = auth_mysql_native_password("p@ssw0rd", &challenge);
        assert_eq!(response.len(), 20);

        use sha1::{Digest, Sha1};
        let stage1 = Sha1::digest(b"p@ssw0rd");
        let stage2 = Sha1::digest(stage1);
        let mut hasher = Sha1::new();
        hasher.update(&challenge);
        hasher.update(stage2);
        let token = hasher.finalize();
        let expected: Vec<u8> = stage1.iter().zip(token.iter()).map(|(a, b)| a ^ b).collect();
        assert_eq!(response, expected);
    }

    #[test]
    fn reads_auth_switch_request() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(b"mysql_native_password\0");
        payload.extend_from_slice(b"01234567890123456789\0");
        let req = read_auth_switch_request(&payload).unwrap();
        assert_eq!(req.plugin_name, b"mysql_native_password");
        assert_eq!(req.plugin_data, b"01234567890123456789");
    }
}
