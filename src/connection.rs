//! Connection settings for the target SQL Server.

use tiberius::{AuthMethod, Config};

/// Everything needed to reach the SQL execution context.
///
/// Built from CLI flags/environment variables by the binary; library users
/// construct it directly.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Accept the server certificate without validation (self-signed TLS).
    pub trust_cert: bool,
}

pub const DEFAULT_PORT: u16 = 1433;

impl ConnectionInfo {
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            database: database.into(),
            user: user.into(),
            password: password.into(),
            trust_cert: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }

    /// The `host:port` address used for the TCP connection.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Build the TDS client configuration.
    pub fn to_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.server);
        config.port(self.port);
        config.database(&self.database);
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if self.trust_cert {
            config.trust_cert();
        }
        config
    }
}
