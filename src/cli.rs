//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::db::Database;
use crate::session::{DEFAULT_COOKIE_NAME, SessionSettings};
use clap::Parser;
use tracing::{error, info};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "autoscheduler-sessions",
    about = "Session state service for the course scheduler"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "autoscheduler.db")]
    pub database: String,

    /// Name of the cookie carrying the session key
    #[arg(long, env = "AUTOSCHEDULER_SESSION_COOKIE", default_value = DEFAULT_COOKIE_NAME, value_parser = validate_cookie_name)]
    pub session_cookie: String,

    /// Lifetime of a login session in seconds
    #[arg(long, env = "AUTOSCHEDULER_SESSION_TTL", default_value = "1209600", value_parser = parse_ttl)]
    pub session_ttl: Duration,

    /// Lifetime of the per-account data session in seconds, refreshed on login
    #[arg(long, env = "AUTOSCHEDULER_DATA_SESSION_TTL", default_value = "31536000", value_parser = parse_ttl)]
    pub data_session_ttl: Duration,

    /// Set the Secure flag on session cookies (use behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Create a user named "<first> <last>" on startup and print its id
    #[arg(long, value_name = "NAME")]
    pub create_user: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn parse_ttl(s: &str) -> Result<Duration, String> {
    let secs: u64 = s
        .parse()
        .map_err(|_| format!("TTL must be a number of seconds: {}", s))?;
    if secs == 0 {
        return Err("TTL must be positive".to_string());
    }
    Ok(Duration::from_secs(secs))
}

fn validate_cookie_name(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("Cookie name cannot be empty".to_string());
    }

    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!("Cookie name contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Split "<first> <last>" at the first whitespace. The last name may be empty.
pub fn split_name(name: &str) -> Option<(&str, &str)> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    match name.split_once(char::is_whitespace) {
        Some((first, last)) => Some((first, last.trim())),
        None => Some((name, "")),
    }
}

/// Handle the --create-user flag. Returns false if the user could not be created.
pub async fn handle_create_user(db: &Database, name: &str) -> bool {
    let Some((first, last)) = split_name(name) else {
        error!("User name cannot be empty");
        return false;
    };

    match db.users().create(first, last).await {
        Ok(id) => {
            info!(user_id = id, first_name = %first, last_name = %last, "User created");
            println!();
            println!("User created: {} {}", first, last);
            println!("User id: {}", id);
            println!();
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to create user");
            false
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(db: Database, args: &Args) -> ServerConfig {
    ServerConfig {
        db,
        session: SessionSettings {
            cookie_name: args.session_cookie.clone(),
            session_ttl: args.session_ttl,
            data_session_ttl: args.data_session_ttl,
            secure_cookies: args.secure_cookies,
        },
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ttl() {
        assert_eq!(parse_ttl("60"), Ok(Duration::from_secs(60)));
        assert!(parse_ttl("0").is_err());
        assert!(parse_ttl("-5").is_err());
        assert!(parse_ttl("soon").is_err());
    }

    #[test]
    fn test_validate_cookie_name() {
        assert!(validate_cookie_name("sessionid").is_ok());
        assert!(validate_cookie_name("my_session-1").is_ok());
        assert!(validate_cookie_name("").is_err());
        assert!(validate_cookie_name("a=b").is_err());
        assert!(validate_cookie_name("a;b").is_err());
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Ada Lovelace"), Some(("Ada", "Lovelace")));
        assert_eq!(split_name("  Ada  King Lovelace "), Some(("Ada", "King Lovelace")));
        assert_eq!(split_name("Cher"), Some(("Cher", "")));
        assert_eq!(split_name("   "), None);
    }

    #[test]
    fn test_default_args() {
        let args = Args::parse_from(["autoscheduler-sessions"]);
        assert_eq!(args.port, 7291);
        assert_eq!(args.session_cookie, "sessionid");
        assert_eq!(args.session_ttl, Duration::from_secs(1_209_600));
        assert_eq!(args.data_session_ttl, Duration::from_secs(31_536_000));
        assert!(!args.secure_cookies);
    }
}
