//! Workspace backups.
//!
//! A bundle is a zip holding a manifest, the gradebook database and a small
//! metadata file. Restores always go through a staged copy that is checked
//! for the gradebook tables before it replaces the live database.

use anyhow::{anyhow, bail, Context};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE_NAME: &str = "gradebook.sqlite3";
const STAGED_SUFFIX: &str = "restore";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const GRADEBOOK_TABLES: [&str; 6] = [
    "users",
    "students",
    "classes",
    "enrollments",
    "assignments",
    "grades",
];

/// Row counts of a gradebook database, reported on export and restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradebookCounts {
    pub classes: i64,
    pub students: i64,
    pub assignments: i64,
    pub grades: i64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub counts: GradebookCounts,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub counts: GradebookCounts,
}

enum BackupKind {
    Bundle,
    RawSqlite,
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", db_path.display());
    }
    let counts = inspect_gradebook(&db_path)?;
    let db_sha256 = file_sha256(&db_path)?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create backup folder {}", parent.display()))?;
    }
    let out_file = File::create(out_path)
        .with_context(|| format!("cannot create backup {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    write_json_entry(
        &mut zip,
        opts,
        MANIFEST_ENTRY,
        &json!({
            "format": BUNDLE_FORMAT_V1,
            "version": 1,
            "appVersion": env!("CARGO_PKG_VERSION"),
            "exportedAt": chrono::Utc::now().to_rfc3339(),
            "dbSha256": db_sha256,
        }),
    )?;

    zip.start_file(DB_ENTRY, opts)?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("cannot read gradebook {}", db_path.display()))?;
    std::io::copy(&mut db_file, &mut zip).context("writing gradebook into backup")?;

    write_json_entry(
        &mut zip,
        opts,
        META_WORKSPACE_ENTRY,
        &json!({
            "sourceWorkspace": workspace_path.to_string_lossy(),
            "counts": counts,
        }),
    )?;
    zip.finish().context("finishing backup zip")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        counts,
    })
}

/// Restores the workspace database from a bundle or a raw SQLite copy.
///
/// The live database is only replaced once the staged copy has been opened
/// and found to hold every gradebook table. On any error the staged file is
/// removed and the workspace is left as it was. The database must not be
/// open while this runs.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("cannot create workspace {}", workspace_path.display()))?;
    let live = workspace_path.join(DB_FILE_NAME);
    let staged = workspace_path.join(format!("{DB_FILE_NAME}.{STAGED_SUFFIX}"));
    let _ = std::fs::remove_file(&staged);

    let (kind, counts) = match stage_restore(in_path, &staged) {
        Ok(v) => v,
        Err(e) => {
            let _ = std::fs::remove_file(&staged);
            return Err(e);
        }
    };

    std::fs::rename(&staged, &live)
        .with_context(|| format!("cannot replace gradebook {}", live.display()))?;

    let detected = match kind {
        BackupKind::Bundle => BUNDLE_FORMAT_V1,
        BackupKind::RawSqlite => RAW_SQLITE_FORMAT,
    };
    Ok(ImportSummary {
        bundle_format_detected: detected.to_string(),
        counts,
    })
}

fn stage_restore(in_path: &Path, staged: &Path) -> anyhow::Result<(BackupKind, GradebookCounts)> {
    let kind = sniff_backup(in_path)?;
    match kind {
        BackupKind::Bundle => extract_bundle_db(in_path, staged)?,
        BackupKind::RawSqlite => {
            std::fs::copy(in_path, staged)
                .with_context(|| format!("cannot stage {}", in_path.display()))?;
        }
    }
    let counts = inspect_gradebook(staged)
        .with_context(|| format!("{} does not hold a usable gradebook", in_path.display()))?;
    Ok((kind, counts))
}

fn sniff_backup(path: &Path) -> anyhow::Result<BackupKind> {
    let mut head = Vec::with_capacity(SQLITE_MAGIC.len());
    File::open(path)
        .with_context(|| format!("cannot open backup {}", path.display()))?
        .take(SQLITE_MAGIC.len() as u64)
        .read_to_end(&mut head)
        .with_context(|| format!("cannot read backup {}", path.display()))?;

    if head.starts_with(ZIP_MAGIC) {
        Ok(BackupKind::Bundle)
    } else if head == SQLITE_MAGIC {
        Ok(BackupKind::RawSqlite)
    } else {
        Err(anyhow!(
            "{} is neither a gradebook bundle nor a SQLite database",
            path.display()
        ))
    }
}

fn extract_bundle_db(in_path: &Path, staged: &Path) -> anyhow::Result<()> {
    let mut archive = ZipArchive::new(File::open(in_path)?).context("unreadable zip bundle")?;

    let manifest: serde_json::Value = {
        let entry = archive
            .by_name(MANIFEST_ENTRY)
            .context("bundle has no manifest.json")?;
        serde_json::from_reader(entry).context("manifest.json is not valid JSON")?
    };
    let format = manifest["format"].as_str().unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {format:?}");
    }

    let mut entry = archive
        .by_name(DB_ENTRY)
        .with_context(|| format!("bundle has no {DB_ENTRY}"))?;
    let mut out = File::create(staged)?;
    std::io::copy(&mut entry, &mut out).context("extracting gradebook from bundle")?;
    out.sync_all()?;

    // Older bundles carry no checksum.
    if let Some(expected) = manifest["dbSha256"].as_str() {
        let actual = file_sha256(staged)?;
        if !actual.eq_ignore_ascii_case(expected) {
            bail!("database checksum mismatch: manifest {expected}, bundle {actual}");
        }
    }
    Ok(())
}

fn file_sha256(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("cannot read {} for checksum", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Opens `path` read-only, checks the SQLite header and the gradebook tables,
/// and returns the row counts.
fn inspect_gradebook(path: &Path) -> anyhow::Result<GradebookCounts> {
    let mut header = [0u8; 16];
    File::open(path)?
        .read_exact(&mut header)
        .context("file is too short to be a SQLite database")?;
    if header[..] != *SQLITE_MAGIC {
        bail!("file is not a SQLite database");
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let tables = {
        let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        names
    };
    let missing: Vec<&str> = GRADEBOOK_TABLES
        .iter()
        .copied()
        .filter(|t| !tables.iter().any(|name| name == t))
        .collect();
    if !missing.is_empty() {
        bail!("missing gradebook tables: {}", missing.join(", "));
    }

    let count = |table: &str| -> rusqlite::Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
    };
    Ok(GradebookCounts {
        classes: count("classes")?,
        students: count("students")?,
        assignments: count("assignments")?,
        grades: count("grades")?,
    })
}

fn write_json_entry(
    zip: &mut ZipWriter<File>,
    opts: FileOptions,
    name: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)?;
    zip.write_all(serde_json::to_string_pretty(value)?.as_bytes())
        .with_context(|| format!("writing {name}"))?;
    Ok(())
}
