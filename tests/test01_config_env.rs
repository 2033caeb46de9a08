use std::collections::HashMap;

use sql_helpers::{Config, DatabaseType, DbError};

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[test]
fn test01_postgres_env_renders_uri() -> Result<(), DbError> {
    let vars = env(&[
        ("POSTGRES_HOST", "127.0.0.2"),
        ("POSTGRES_PORT", "1234"),
        ("POSTGRES_DB", "test_db"),
        ("POSTGRES_CONNECT_TIMEOUT", "69"),
        ("POSTGRES_SSLMODE", "any_dumb_value"),
    ]);
    let mut cfg = Config::default();
    cfg.init_from(&vars)?;
    assert_eq!(cfg.db_type, Some(DatabaseType::Postgres));
    assert_eq!(
        cfg.uri()?.as_str(),
        "postgres://127.0.0.2:1234/test_db?connect_timeout=69&sslmode=any_dumb_value"
    );
    Ok(())
}

#[test]
fn test01_mysql_env_uses_mysql_names() -> Result<(), DbError> {
    let vars = env(&[
        ("DATABASE_TYPE", "mysql"),
        ("POSTGRES_HOST", "wrong-host"),
        ("POSTGRES_USER", "wrong-user"),
        ("MYSQL_HOST", "127.0.0.2"),
        ("MYSQL_PORT", "1234"),
        ("MYSQL_DB", "test_db"),
        ("MYSQL_CONNECT_TIMEOUT", "69"),
        ("MYSQL_SSLMODE", "any_dumb_value"),
    ]);
    let mut cfg = Config::default();
    cfg.init_from(&vars)?;
    assert_eq!(
        cfg.uri()?.as_str(),
        "mysql://127.0.0.2:1234/test_db?connect-timeout=69&ssl-mode=any_dumb_value"
    );
    assert_eq!(cfg.user, None);
    Ok(())
}

#[test]
fn test01_defaults_without_env() -> Result<(), DbError> {
    let mut cfg = Config::default().with_dbname("app");
    cfg.init_from(&HashMap::<String, String>::new())?;
    assert_eq!(cfg.uri()?.as_str(), "postgres://localhost:5432/app");

    let mut mysql = Config::default().with_type(DatabaseType::Mysql);
    mysql.init_from(&HashMap::<String, String>::new())?;
    assert_eq!(mysql.port, Some(3306));
    Ok(())
}

#[test]
fn test01_half_credentials_are_dropped() -> Result<(), DbError> {
    let user_only = Config::default()
        .with_host("db")
        .with_port(5432)
        .with_dbname("app")
        .with_user("alice");
    assert_eq!(user_only.uri()?.as_str(), "postgres://db:5432/app");

    let password_only = user_only.clone().with_user("").with_password("secret");
    assert_eq!(password_only.uri()?.as_str(), "postgres://db:5432/app");

    let both = user_only.with_password("secret");
    assert_eq!(both.uri()?.as_str(), "postgres://alice:secret@db:5432/app");
    assert_eq!(both.to_string(), "postgres://alice:xxxxx@db:5432/app");
    Ok(())
}

#[test]
fn test01_bad_values_are_config_errors() {
    for (key, value) in [
        ("POSTGRES_CONNECT_TIMEOUT", "soon"),
        ("POSTGRES_PORT", "99999"),
        ("DATABASE_TYPE", "oracle"),
    ] {
        let mut cfg = Config::default();
        let err = cfg.init_from(&env(&[(key, value)])).unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)), "{key}={value}: {err}");
    }
}

#[test]
fn test01_config_round_trips_through_json() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::default()
        .with_type(DatabaseType::Postgres)
        .with_host("db")
        .with_dbname("app")
        .with_connect_timeout(5);
    let json = serde_json::to_string(&cfg)?;
    let back: Config = serde_json::from_str(&json)?;
    assert_eq!(back, cfg);
    assert!(json.contains("\"postgres\""));
    Ok(())
}
