//! Connection configuration derived from explicit fields and environment variables.
//!
//! ```rust
//! use std::collections::HashMap;
//! use sql_helpers::{Config, DatabaseType};
//!
//! let env = HashMap::from([("POSTGRES_DB".to_string(), "app".to_string())]);
//! let mut cfg = Config::default().with_type(DatabaseType::Postgres);
//! cfg.init_from(&env)?;
//! assert_eq!(cfg.uri()?.as_str(), "postgres://localhost:5432/app");
//! # Ok::<(), sql_helpers::DbError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{Config as PgConfig, Pool, Runtime, SslMode};
use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use url::Url;

use crate::error::{DbError, DbResult};
use crate::types::DatabaseType;

const DATABASE_TYPE_VAR: &str = "DATABASE_TYPE";
const DEFAULT_HOST: &str = "localhost";

/// Where [`Config::init_from`] looks up variables.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl<S: BuildHasher> EnvSource for HashMap<String, String, S> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Connection parameters for one database target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub db_type: Option<DatabaseType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub ssl_mode: Option<String>,
    pub ssl_ca: Option<String>,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub ssl_sni: Option<String>,
    /// Seconds; zero counts as unset.
    pub connect_timeout: Option<u64>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

fn lookup<E: EnvSource + ?Sized>(env: &E, key: &str) -> Option<String> {
    env.var(key).filter(|v| !v.is_empty())
}

fn parse_var<T, E>(env: &E, key: &str) -> DbResult<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    E: EnvSource + ?Sized,
{
    lookup(env, key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                DbError::ConfigError(format!("invalid value {raw:?} for {key}: {e}"))
            })
        })
        .transpose()
}

fn fill<E: EnvSource + ?Sized>(field: &mut Option<String>, env: &E, key: &str) {
    if non_empty(field.as_ref()).is_none() {
        *field = lookup(env, key);
    }
}

impl Config {
    /// Build a config entirely from the process environment.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` when a variable holds an unusable value.
    pub fn from_env() -> DbResult<Self> {
        let mut cfg = Self::default();
        cfg.init()?;
        Ok(cfg)
    }

    /// Fill every unset field from the process environment.
    ///
    /// # Errors
    /// See [`Config::init_from`].
    pub fn init(&mut self) -> DbResult<()> {
        self.init_from(&ProcessEnv)
    }

    /// Fill every unset field from `env`.
    ///
    /// The kind comes from `DATABASE_TYPE` (default postgres) and determines the prefix of the
    /// remaining variables, e.g. `MYSQL_HOST`. Host defaults to `localhost` and port to the
    /// kind's well-known port.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` for an unknown `DATABASE_TYPE`, or a `_PORT` /
    /// `_CONNECT_TIMEOUT` value that is not an unsigned integer.
    pub fn init_from<E: EnvSource + ?Sized>(&mut self, env: &E) -> DbResult<()> {
        let kind = match self.db_type {
            Some(kind) => kind,
            None => match lookup(env, DATABASE_TYPE_VAR) {
                Some(raw) => raw.parse()?,
                None => DatabaseType::Postgres,
            },
        };
        self.db_type = Some(kind);
        let prefix = kind.env_prefix();
        let key = |field: &str| format!("{prefix}{field}");

        if non_empty(self.host.as_ref()).is_none() {
            self.host = Some(lookup(env, &key("HOST")).unwrap_or_else(|| DEFAULT_HOST.into()));
        }
        if self.port.is_none() {
            self.port = Some(parse_var(env, &key("PORT"))?.unwrap_or(kind.default_port()));
        }
        fill(&mut self.user, env, &key("USER"));
        fill(&mut self.password, env, &key("PASSWORD"));
        fill(&mut self.dbname, env, &key("DB"));
        fill(&mut self.ssl_mode, env, &key("SSLMODE"));
        if self.connect_timeout.unwrap_or(0) == 0 {
            self.connect_timeout =
                parse_var::<u64, _>(env, &key("CONNECT_TIMEOUT"))?.filter(|t| *t > 0);
        }
        Ok(())
    }

    #[must_use]
    pub fn with_type(mut self, db_type: DatabaseType) -> Self {
        self.db_type = Some(db_type);
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    #[must_use]
    pub fn with_ssl_mode(mut self, mode: impl Into<String>) -> Self {
        self.ssl_mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_ssl_ca(mut self, path: impl Into<String>) -> Self {
        self.ssl_ca = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ssl_cert(mut self, path: impl Into<String>) -> Self {
        self.ssl_cert = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ssl_key(mut self, path: impl Into<String>) -> Self {
        self.ssl_key = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_ssl_sni(mut self, sni: impl Into<String>) -> Self {
        self.ssl_sni = Some(sni.into());
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = Some(secs);
        self
    }

    /// Kind-specific query parameters, sorted by key, empty values dropped.
    fn query_params(&self, kind: DatabaseType) -> Vec<(&'static str, String)> {
        let timeout = self
            .connect_timeout
            .filter(|t| *t > 0)
            .map(|t| t.to_string());
        let text = |v: &Option<String>| non_empty(v.as_ref()).map(str::to_string);

        let candidates = match kind {
            DatabaseType::Postgres => vec![
                ("connect_timeout", timeout),
                ("sslmode", text(&self.ssl_mode)),
                ("sslrootcert", text(&self.ssl_ca)),
                ("sslcert", text(&self.ssl_cert)),
                ("sslkey", text(&self.ssl_key)),
                ("sslsni", text(&self.ssl_sni)),
            ],
            DatabaseType::Mysql => vec![
                ("connect-timeout", timeout),
                ("ssl-mode", text(&self.ssl_mode)),
                ("ssl-ca", text(&self.ssl_ca)),
                ("ssl-cert", text(&self.ssl_cert)),
                ("ssl-key", text(&self.ssl_key)),
            ],
        };
        let mut params: Vec<(&'static str, String)> = candidates
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        params.sort_by_key(|(k, _)| *k);
        params
    }

    /// Render `scheme://[user:password@]host:port/dbname[?query]`.
    ///
    /// Credentials are only included when both user and password are set.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if the host or credentials cannot form a valid URL.
    pub fn uri(&self) -> DbResult<Url> {
        let kind = self.db_type.unwrap_or(DatabaseType::Postgres);
        let host = non_empty(self.host.as_ref()).unwrap_or(DEFAULT_HOST);
        let port = self.port.unwrap_or(kind.default_port());
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        };

        let mut url = Url::parse(&format!("{kind}://{host}:{port}"))
            .map_err(|e| DbError::ConfigError(format!("invalid address {host}:{port}: {e}")))?;
        let dbname = non_empty(self.dbname.as_ref()).unwrap_or("");
        url.set_path(&format!("/{}", dbname.trim_start_matches('/')));

        if let (Some(user), Some(password)) = (
            non_empty(self.user.as_ref()),
            non_empty(self.password.as_ref()),
        ) {
            url.set_username(user)
                .map_err(|()| DbError::ConfigError("cannot set user on URI".into()))?;
            url.set_password(Some(password))
                .map_err(|()| DbError::ConfigError("cannot set password on URI".into()))?;
        }

        let params = self.query_params(kind);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    /// Translate into a `deadpool_postgres` config.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` if this is not a postgres config, the database name or
    /// user is missing, or the SSL mode is not one of `disable`, `prefer`, `require`.
    pub fn to_pg_config(&self) -> DbResult<PgConfig> {
        let kind = self.db_type.unwrap_or(DatabaseType::Postgres);
        if kind != DatabaseType::Postgres {
            return Err(DbError::ConfigError(format!(
                "cannot build a postgres pool for a {kind} config"
            )));
        }
        let Some(dbname) = non_empty(self.dbname.as_ref()) else {
            return Err(DbError::ConfigError("dbname is required".to_string()));
        };
        let Some(user) = non_empty(self.user.as_ref()) else {
            return Err(DbError::ConfigError("user is required".to_string()));
        };

        let mut pg_config = PgConfig::new();
        pg_config.host = Some(non_empty(self.host.as_ref()).unwrap_or(DEFAULT_HOST).into());
        pg_config.port = Some(self.port.unwrap_or(kind.default_port()));
        pg_config.dbname = Some(dbname.into());
        pg_config.user = Some(user.into());
        pg_config.password = non_empty(self.password.as_ref()).map(str::to_string);
        pg_config.connect_timeout = self
            .connect_timeout
            .filter(|t| *t > 0)
            .map(Duration::from_secs);
        pg_config.ssl_mode = match non_empty(self.ssl_mode.as_ref()) {
            None => None,
            Some("disable") => Some(SslMode::Disable),
            Some("prefer") => Some(SslMode::Prefer),
            Some("require") => Some(SslMode::Require),
            Some(other) => {
                return Err(DbError::ConfigError(format!(
                    "unsupported sslmode {other:?} for the postgres driver"
                )));
            }
        };
        Ok(pg_config)
    }

    /// Create a postgres connection pool. No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `DbError::ConfigError` from [`Config::to_pg_config`] or
    /// `DbError::ConnectionError` if pool creation fails.
    pub fn create_pg_pool(&self) -> DbResult<Pool> {
        self.to_pg_config()?
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DbError::ConnectionError(format!("Failed to create Postgres pool: {e}")))
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uri() {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("xxxxx"));
                }
                write!(f, "{url}")
            }
            Err(_) => f.write_str("<invalid database config>"),
        }
    }
}
