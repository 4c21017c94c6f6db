use std::path::PathBuf;

use thiserror::Error;

/// Failures while acquiring the input snapshot. Everything that goes wrong
/// after the snapshot is in hand is handled inside the calculators.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("DATABASE_URL must be set to read from Postgres")]
    MissingDatabaseUrl,

    #[error("failed to connect to Postgres at {target}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to load {collection} from Postgres")]
    Query {
        collection: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("data directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("failed to read {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Strips credentials from a connection string before it reaches logs or
/// error messages.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
