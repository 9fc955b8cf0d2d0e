//! Whole-store snapshots in SQLite.
//!
//! # Responsibility
//! - Persist every sample of an `InMemorySampleRepository` in one transaction.
//! - Rebuild a store from the last snapshot, counter included.
//!
//! # Invariants
//! - A save replaces the previous snapshot entirely or not at all.
//! - A load rejects rows that fail validation or the integrity check
//!   instead of masking them.

use crate::db::DbError;
use crate::model::sample::{Metadata, Sample, SampleId};
use crate::repo::sample_repo::{InMemorySampleRepository, RepoError, SampleRepository};
use crate::service::integrity::{check_integrity, IntegrityViolation};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info};
use rusqlite::{params, Connection, Row};
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

const NEXT_CODE_KEY: &str = "next_code_number";

const SAMPLE_SELECT_SQL: &str = "SELECT
    uuid,
    human_code,
    name,
    sample_type,
    created_by,
    created_at,
    is_container,
    container_uuid,
    barcode,
    metadata_json,
    file_paths_json,
    parent_ids_json,
    child_ids_json,
    contained_ids_json
FROM samples
ORDER BY position ASC";

/// Snapshot save/load failures.
#[derive(Debug)]
pub enum SnapshotError {
    Db(DbError),
    Encode(serde_json::Error),
    InvalidData(String),
    Repo(RepoError),
    Integrity(Vec<IntegrityViolation>),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode snapshot column: {err}"),
            Self::InvalidData(message) => write!(f, "invalid snapshot data: {message}"),
            Self::Repo(err) => write!(f, "snapshot rejected by store: {err}"),
            Self::Integrity(violations) => {
                write!(f, "snapshot breaks {} invariant(s)", violations.len())?;
                if let Some(first) = violations.first() {
                    write!(f, ", first: {first}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvalidData(_) | Self::Integrity(_) => None,
        }
    }
}

impl From<DbError> for SnapshotError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SnapshotError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RepoError> for SnapshotError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// What a save or load moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub samples: usize,
    pub next_code_number: u64,
}

/// Replaces the stored snapshot with the current content of `repo`.
pub fn save_snapshot(
    conn: &mut Connection,
    repo: &InMemorySampleRepository,
) -> Result<SnapshotSummary, SnapshotError> {
    let started_at = Instant::now();
    let samples = repo.get_all();
    let summary = SnapshotSummary {
        samples: samples.len(),
        next_code_number: repo.next_code_number(),
    };

    let result = write_rows(conn, &samples, summary.next_code_number);
    match &result {
        Ok(()) => info!(
            "event=snapshot_save module=db status=ok samples={} next_code={} duration_ms={}",
            summary.samples,
            summary.next_code_number,
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=snapshot_save module=db status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result.map(|()| summary)
}

/// Rebuilds a store from the stored snapshot.
///
/// Generated codes continue after the counter value saved with the
/// snapshot, so codes of samples deleted before the save are not reused.
pub fn load_snapshot(
    conn: &Connection,
    prefix: &str,
) -> Result<InMemorySampleRepository, SnapshotError> {
    let started_at = Instant::now();

    let mut stmt = conn.prepare(SAMPLE_SELECT_SQL)?;
    let mut rows = stmt.query([])?;
    let mut samples = Vec::new();
    while let Some(row) = rows.next()? {
        samples.push(parse_sample_row(row)?);
    }

    let mut repo = InMemorySampleRepository::restore(prefix, samples)?;
    if let Some(next) = read_next_code_number(conn)? {
        repo.reset_human_codes(next.saturating_sub(1));
    }

    let violations = check_integrity(&repo);
    if !violations.is_empty() {
        error!(
            "event=snapshot_load module=db status=error error_code=integrity violations={}",
            violations.len()
        );
        return Err(SnapshotError::Integrity(violations));
    }

    info!(
        "event=snapshot_load module=db status=ok samples={} next_code={} duration_ms={}",
        repo.count(),
        repo.next_code_number(),
        started_at.elapsed().as_millis()
    );
    Ok(repo)
}

fn write_rows(
    conn: &mut Connection,
    samples: &[Sample],
    next_code_number: u64,
) -> Result<(), SnapshotError> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM samples;", [])?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO samples (
                uuid,
                human_code,
                position,
                name,
                sample_type,
                created_by,
                created_at,
                is_container,
                container_uuid,
                barcode,
                metadata_json,
                file_paths_json,
                parent_ids_json,
                child_ids_json,
                contained_ids_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15);",
        )?;
        for (position, sample) in samples.iter().enumerate() {
            insert.execute(params![
                sample.id.to_string(),
                sample.human_code.as_str(),
                position as i64,
                sample.name.as_str(),
                sample.sample_type.as_str(),
                sample.created_by.as_str(),
                sample
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
                bool_to_int(sample.is_container),
                sample.container_id.map(|id| id.to_string()),
                sample.barcode.as_deref(),
                to_json(&sample.metadata)?,
                to_json(&sample.file_paths)?,
                to_json(&sample.parent_ids)?,
                to_json(&sample.child_ids)?,
                to_json(&sample.contained_sample_ids)?,
            ])?;
        }
    }
    tx.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        params![NEXT_CODE_KEY, next_code_number.to_string()],
    )?;
    tx.commit()?;
    Ok(())
}

fn read_next_code_number(conn: &Connection) -> Result<Option<u64>, SnapshotError> {
    let mut stmt = conn.prepare("SELECT value FROM store_meta WHERE key = ?1;")?;
    let mut rows = stmt.query([NEXT_CODE_KEY])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let value: String = row.get(0)?;
    value.parse::<u64>().map(Some).map_err(|_| {
        SnapshotError::InvalidData(format!(
            "invalid counter value `{value}` in store_meta.{NEXT_CODE_KEY}"
        ))
    })
}

fn parse_sample_row(row: &Row<'_>) -> Result<Sample, SnapshotError> {
    let id = parse_uuid(&row.get::<_, String>("uuid")?, "samples.uuid")?;

    let created_text: String = row.get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_text)
        .map_err(|_| {
            SnapshotError::InvalidData(format!(
                "invalid timestamp `{created_text}` in samples.created_at"
            ))
        })?
        .with_timezone(&Utc);

    let is_container = match row.get::<_, i64>("is_container")? {
        0 => false,
        1 => true,
        other => {
            return Err(SnapshotError::InvalidData(format!(
                "invalid is_container value `{other}` in samples.is_container"
            )));
        }
    };

    let container_id = match row.get::<_, Option<String>>("container_uuid")? {
        Some(text) => Some(parse_uuid(&text, "samples.container_uuid")?),
        None => None,
    };

    let sample = Sample {
        id,
        human_code: row.get("human_code")?,
        name: row.get("name")?,
        sample_type: row.get("sample_type")?,
        created_by: row.get("created_by")?,
        created_at,
        metadata: from_json::<Metadata>(row, "metadata_json")?,
        file_paths: from_json::<BTreeSet<String>>(row, "file_paths_json")?,
        parent_ids: from_json::<BTreeSet<SampleId>>(row, "parent_ids_json")?,
        child_ids: from_json::<BTreeSet<SampleId>>(row, "child_ids_json")?,
        is_container,
        contained_sample_ids: from_json::<BTreeSet<SampleId>>(row, "contained_ids_json")?,
        container_id,
        barcode: row.get("barcode")?,
    };
    sample
        .validate()
        .map_err(|err| SnapshotError::InvalidData(format!("sample {id}: {err}")))?;
    Ok(sample)
}

fn parse_uuid(text: &str, column: &str) -> Result<Uuid, SnapshotError> {
    Uuid::parse_str(text)
        .map_err(|_| SnapshotError::InvalidData(format!("invalid uuid value `{text}` in {column}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, SnapshotError> {
    serde_json::to_string(value).map_err(SnapshotError::Encode)
}

fn from_json<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> Result<T, SnapshotError> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|err| {
        SnapshotError::InvalidData(format!("invalid JSON in samples.{column}: {err}"))
    })
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::{load_snapshot, save_snapshot, SnapshotError};
    use crate::db::open_db_in_memory;
    use crate::model::sample::Sample;
    use crate::repo::sample_repo::{InMemorySampleRepository, SampleRepository};

    #[test]
    fn empty_database_loads_empty_store() {
        let conn = open_db_in_memory().unwrap();
        let repo = load_snapshot(&conn, "s").unwrap();

        assert_eq!(repo.count(), 0);
        assert_eq!(repo.next_code_number(), 1);
    }

    #[test]
    fn save_replaces_previous_rows() {
        let mut conn = open_db_in_memory().unwrap();
        let mut repo = InMemorySampleRepository::new();
        let first = repo
            .create_sample(Sample::new("Blood draw", "Blood", "alice"))
            .unwrap();
        repo.create_sample(Sample::new("Plasma", "Plasma", "alice"))
            .unwrap();
        save_snapshot(&mut conn, &repo).unwrap();

        repo.delete_sample(first.id);
        let summary = save_snapshot(&mut conn, &repo).unwrap();
        assert_eq!(summary.samples, 1);

        let loaded = load_snapshot(&conn, "s").unwrap();
        assert_eq!(loaded.count(), 1);
        assert!(loaded.get_sample(first.id).is_none());
        assert_eq!(loaded.next_code_number(), 3);
    }

    #[test]
    fn corrupted_row_is_rejected() {
        let mut conn = open_db_in_memory().unwrap();
        let mut repo = InMemorySampleRepository::new();
        repo.create_sample(Sample::new("Blood draw", "Blood", "alice"))
            .unwrap();
        save_snapshot(&mut conn, &repo).unwrap();
        conn.execute("UPDATE samples SET parent_ids_json = 'nope';", [])
            .unwrap();

        let err = load_snapshot(&conn, "s").unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidData(_)));
    }
}
