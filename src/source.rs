use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::db;
use crate::error::SnapshotError;
use crate::models::Snapshot;

pub const USERS_FILE: &str = "users.csv";
pub const MENTORS_FILE: &str = "mentors.csv";
pub const COURSES_FILE: &str = "courses.csv";
pub const ENROLLMENTS_FILE: &str = "enrollments.csv";
pub const SUBMISSIONS_FILE: &str = "submissions.csv";

/// Where the snapshot comes from. The engine only ever sees the rows.
pub enum SnapshotSource {
    Postgres { database_url: String },
    Csv { dir: PathBuf },
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotSource::Postgres { database_url } => {
                write!(f, "postgres {}", crate::error::redact_url(database_url))
            }
            SnapshotSource::Csv { dir } => write!(f, "csv {}", dir.display()),
        }
    }
}

impl SnapshotSource {
    pub async fn load(&self) -> Result<Snapshot, SnapshotError> {
        info!(source = %self, "loading snapshot");
        let snapshot = match self {
            SnapshotSource::Postgres { database_url } => {
                let pool = db::connect(database_url).await?;
                let snapshot = db::fetch_snapshot(&pool).await;
                pool.close().await;
                snapshot?
            }
            SnapshotSource::Csv { dir } => load_csv_dir(dir)?,
        };
        info!(
            users = snapshot.users.len(),
            mentors = snapshot.mentors.len(),
            courses = snapshot.courses.len(),
            enrollments = snapshot.enrollments.len(),
            submissions = snapshot.submissions.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }
}

/// Reads one file per collection. A missing file means an empty collection,
/// so a directory holding only `enrollments.csv` still feeds the completion
/// report.
pub fn load_csv_dir(dir: &Path) -> Result<Snapshot, SnapshotError> {
    if !dir.is_dir() {
        return Err(SnapshotError::MissingDirectory(dir.to_path_buf()));
    }

    Ok(Snapshot {
        users: read_rows(&dir.join(USERS_FILE))?,
        mentors: read_rows(&dir.join(MENTORS_FILE))?,
        courses: read_rows(&dir.join(COURSES_FILE))?,
        enrollments: read_rows(&dir.join(ENROLLMENTS_FILE))?,
        submissions: read_rows(&dir.join(SUBMISSIONS_FILE))?,
    })
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SnapshotError> {
    if !path.exists() {
        warn!(path = %path.display(), "file not found, treating collection as empty");
        return Ok(Vec::new());
    }

    let csv_error = |source| SnapshotError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut rows = Vec::new();

    for result in reader.deserialize::<T>() {
        rows.push(result.map_err(csv_error)?);
    }

    Ok(rows)
}
