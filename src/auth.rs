//! The authentication collaborator contract (§6): `name()` plus `compute(password,
//! challenge) -> response`. The core ships [`MysqlNativePassword`]; any other plugin is
//! registered the same way and selected during the handshake by name (§4.4 step 3).

use std::sync::Arc;

/// A pluggable authentication scheme identified by the name the server sends in the
/// initial handshake (or an `AuthSwitchRequest`).
pub trait AuthPlugin: Send + Sync {
    fn name(&self) -> &'static [u8];

    /// Computes the authentication response for `password` given the server's
    /// challenge bytes. The challenge length is plugin-defined; `mysql_native_password`
    /// expects 20 bytes but accepts any length (§9 Open Questions), truncating rather
    /// than failing outright.
    fn compute(&self, password: &str, challenge: &[u8]) -> Vec<u8>;
}

/// `mysql_native_password` (§4.3): the only scheme this core implements.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlNativePassword;

impl AuthPlugin for MysqlNativePassword {
    fn name(&self) -> &'static [u8] {
        crate::protocol::handshake::MYSQL_NATIVE_PASSWORD
    }

    fn compute(&self, password: &str, challenge: &[u8]) -> Vec<u8> {
        crate::protocol::handshake::auth_mysql_native_password(password, challenge)
    }
}

/// The set of plugins a connection is willing to use, in registration order. Defaults
/// to just [`MysqlNativePassword`]; `Opts::auth_plugins` lets a caller register more
/// (e.g. a `caching_sha2_password` implementation living outside the core).
#[derive(Clone)]
pub struct AuthPlugins(pub(crate) Vec<Arc<dyn AuthPlugin>>);

impl AuthPlugins {
    pub fn find(&self, name: &[u8]) -> Option<&Arc<dyn AuthPlugin>> {
        self.0.iter().find(|p| p.name() == name)
    }
}

impl Default for AuthPlugins {
    fn default() -> Self {
        Self(vec![Arc::new(MysqlNativePassword)])
    }
}

impl std::fmt::Debug for AuthPlugins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|p| String::from_utf8_lossy(p.name())))
            .finish()
    }
}
