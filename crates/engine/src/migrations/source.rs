//! Migration Source - File system operations for migrations
//!
//! Handles creating, loading, parsing and renumbering migration files. This is
//! the only part of the engine that touches the filesystem.
//!
//! Files are named `<version>_<name>.sql` and use goose-style annotations:
//!
//! ```sql
//! -- +goose Up
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//!
//! -- +goose Down
//! DROP TABLE users;
//! ```

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::definitions::{
    Migration, MigrationConfig, Rename, VersionScheme, TIMESTAMP_VERSION_FLOOR,
};
use crate::error::{MigrateError, MigrateResult};

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_([^.]+)\.sql$").expect("valid migration file name regex"));

const ANNOTATION_PREFIX: &str = "-- +goose";

/// Migration source for creating, loading and fixing migrations
#[derive(Debug, Clone)]
pub struct MigrationSource {
    config: MigrationConfig,
}

impl MigrationSource {
    /// Create a new migration source with default configuration
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration source with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Create a migration source reading `dir`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self::with_config(MigrationConfig {
            migrations_dir: dir.into(),
            ..MigrationConfig::default()
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.config.migrations_dir
    }

    /// Load all migrations, sorted ascending by version.
    ///
    /// Fails on a missing directory, malformed file names, unparsable scripts
    /// and duplicate versions.
    pub fn load_all(&self) -> MigrateResult<Vec<Migration>> {
        let migrations = self.scan()?;

        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(MigrateError::Source(format!(
                    "duplicate migration version {}: {} and {} (run `fix` to renumber)",
                    pair[0].version,
                    pair[0].path.display(),
                    pair[1].path.display()
                )));
            }
        }

        debug!(
            dir = %self.dir().display(),
            count = migrations.len(),
            "Loaded migrations"
        );
        Ok(migrations)
    }

    /// Create a new migration file from the template and return it parsed.
    /// The migrations directory is created when missing.
    pub fn create(&self, name: &str, scheme: VersionScheme) -> MigrateResult<Migration> {
        let name = normalize_name(name)?;

        fs::create_dir_all(self.dir()).map_err(|e| {
            MigrateError::Source(format!(
                "failed to create migrations directory {}: {}",
                self.dir().display(),
                e
            ))
        })?;

        let next = self.latest_version()?.checked_add(1).ok_or_else(|| {
            MigrateError::Source("no version left after the highest existing one".to_string())
        })?;
        let (version, filename) = match scheme {
            VersionScheme::Timestamp => {
                let now: i64 = Utc::now()
                    .format("%Y%m%d%H%M%S")
                    .to_string()
                    .parse()
                    .map_err(|e| MigrateError::Source(format!("invalid timestamp: {}", e)))?;
                let version = now.max(next);
                (version, format!("{}_{}.sql", version, name))
            }
            VersionScheme::Sequential => (next, format!("{:05}_{}.sql", next, name)),
        };

        let path = self.dir().join(&filename);
        if path.exists() {
            return Err(MigrateError::Source(format!(
                "migration file {} already exists",
                path.display()
            )));
        }

        fs::write(&path, migration_template(&name)).map_err(|e| {
            MigrateError::Source(format!("failed to write {}: {}", path.display(), e))
        })?;

        info!(version, file = %path.display(), "Created new migration");
        self.parse_file(&path)
    }

    /// Renumber timestamp-style and colliding versions to sequential ones.
    ///
    /// Sequential scripts keep their version unless an earlier script already
    /// claimed it. Everything else is moved, in order, after the highest kept
    /// version.
    pub fn fix(&self) -> MigrateResult<Vec<Rename>> {
        let migrations = self.scan()?;

        let mut kept = HashSet::new();
        let mut to_renumber = Vec::new();
        for migration in migrations {
            if migration.version < TIMESTAMP_VERSION_FLOOR && kept.insert(migration.version) {
                continue;
            }
            to_renumber.push(migration);
        }

        let mut next = kept.iter().copied().max().unwrap_or(0) + 1;
        let mut renames = Vec::with_capacity(to_renumber.len());

        for migration in to_renumber {
            let to = self.dir().join(format!("{:05}_{}.sql", next, migration.name));
            if to.exists() {
                return Err(MigrateError::Source(format!(
                    "cannot rename {}: {} already exists",
                    migration.path.display(),
                    to.display()
                )));
            }

            fs::rename(&migration.path, &to).map_err(|e| {
                MigrateError::Source(format!(
                    "failed to rename {}: {}",
                    migration.path.display(),
                    e
                ))
            })?;

            info!(
                from = %migration.path.display(),
                to = %to.display(),
                "Renumbered migration"
            );
            renames.push(Rename {
                from: migration.path,
                to,
                old_version: migration.version,
                new_version: next,
            });
            next += 1;
        }

        Ok(renames)
    }

    /// Highest version among the script file names, without reading the
    /// scripts. Names that do not parse are skipped.
    fn latest_version(&self) -> MigrateResult<i64> {
        let entries = fs::read_dir(self.dir()).map_err(|e| {
            MigrateError::Source(format!("failed to read {}: {}", self.dir().display(), e))
        })?;

        let mut latest = 0;
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrateError::Source(format!("failed to read directory entry: {}", e))
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if !file_name.ends_with(".sql") {
                continue;
            }
            match parse_file_name(file_name) {
                Ok((version, _)) => latest = latest.max(version),
                Err(e) => debug!(file = file_name, error = %e, "Skipping file while allocating version"),
            }
        }
        Ok(latest)
    }

    /// Parse every `.sql` file without checking for duplicate versions.
    /// Sorted by version, then path.
    fn scan(&self) -> MigrateResult<Vec<Migration>> {
        let dir = self.dir();
        if !dir.is_dir() {
            return Err(MigrateError::Source(format!(
                "migrations directory {} does not exist",
                dir.display()
            )));
        }

        let entries = fs::read_dir(dir).map_err(|e| {
            MigrateError::Source(format!("failed to read {}: {}", dir.display(), e))
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrateError::Source(format!("failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if path.is_file() && path.extension().map_or(false, |ext| ext == "sql") {
                migrations.push(self.parse_file(&path)?);
            }
        }

        migrations.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));
        Ok(migrations)
    }

    /// Parse a migration file into a Migration struct
    fn parse_file(&self, path: &Path) -> MigrateResult<Migration> {
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                MigrateError::Source(format!("invalid migration file name {}", path.display()))
            })?;

        let (version, name) = parse_file_name(filename)?;

        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::Source(format!("failed to read {}: {}", path.display(), e))
        })?;

        let script = parse_script(&content)
            .map_err(|reason| MigrateError::Source(format!("{}: {}", filename, reason)))?;

        Ok(Migration {
            version,
            name,
            up: script.up,
            down: script.down,
            use_transaction: script.use_transaction,
            path: path.to_path_buf(),
        })
    }
}

impl Default for MigrationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Split `<version>_<name>.sql` into its parts
pub(crate) fn parse_file_name(filename: &str) -> MigrateResult<(i64, String)> {
    let captures = FILE_NAME.captures(filename).ok_or_else(|| {
        MigrateError::Source(format!(
            "malformed migration file name '{}': expected <version>_<name>.sql",
            filename
        ))
    })?;

    let version: i64 = captures[1].parse().map_err(|_| {
        MigrateError::Source(format!(
            "unparsable version '{}' in {}",
            &captures[1], filename
        ))
    })?;
    if version <= 0 {
        return Err(MigrateError::Source(format!(
            "migration version must be positive in {}",
            filename
        )));
    }

    Ok((version, captures[2].to_string()))
}

#[derive(Debug, Default)]
struct ParsedScript {
    up: Vec<String>,
    down: Vec<String>,
    use_transaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Parse annotated script content into up and down statements
fn parse_script(content: &str) -> Result<ParsedScript, String> {
    let mut script = ParsedScript {
        use_transaction: true,
        ..Default::default()
    };
    let mut section = Section::Preamble;
    let mut seen_up = false;
    let mut seen_down = false;
    let mut in_block = false;
    let mut buffer = String::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();

        if let Some(annotation) = trimmed.strip_prefix(ANNOTATION_PREFIX) {
            match annotation.trim().to_ascii_lowercase().as_str() {
                "up" => {
                    if seen_up {
                        return Err(format!("line {}: duplicate Up annotation", line_no));
                    }
                    finish_section(section, in_block, &buffer)?;
                    seen_up = true;
                    section = Section::Up;
                }
                "down" => {
                    if seen_down {
                        return Err(format!("line {}: duplicate Down annotation", line_no));
                    }
                    finish_section(section, in_block, &buffer)?;
                    seen_down = true;
                    section = Section::Down;
                }
                "statementbegin" => {
                    if in_block {
                        return Err(format!("line {}: nested StatementBegin", line_no));
                    }
                    if section == Section::Preamble {
                        return Err(format!("line {}: StatementBegin before Up", line_no));
                    }
                    in_block = true;
                }
                "statementend" => {
                    if !in_block {
                        return Err(format!("line {}: StatementEnd without StatementBegin", line_no));
                    }
                    in_block = false;
                    push_statement(&mut script, section, &mut buffer);
                }
                "no transaction" => script.use_transaction = false,
                other => {
                    return Err(format!("line {}: unknown annotation '{}'", line_no, other));
                }
            }
            continue;
        }

        if section == Section::Preamble {
            if trimmed.is_empty() || trimmed.starts_with("--") {
                continue;
            }
            return Err(format!("line {}: SQL before the Up annotation", line_no));
        }

        if !in_block && buffer.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        buffer.push_str(line);
        buffer.push('\n');

        if !in_block && ends_with_semicolon(trimmed) {
            push_statement(&mut script, section, &mut buffer);
        }
    }

    finish_section(section, in_block, &buffer)?;

    if !seen_up {
        return Err("missing '-- +goose Up' annotation".to_string());
    }
    if script.up.is_empty() {
        return Err("up section has no statements".to_string());
    }

    Ok(script)
}

fn push_statement(script: &mut ParsedScript, section: Section, buffer: &mut String) {
    let statement = buffer.trim().to_string();
    buffer.clear();
    if statement.is_empty() {
        return;
    }
    match section {
        Section::Up => script.up.push(statement),
        Section::Down => script.down.push(statement),
        Section::Preamble => {}
    }
}

/// Whether the last word before any `--` comment ends with `;`
fn ends_with_semicolon(line: &str) -> bool {
    line.split_whitespace()
        .take_while(|word| !word.starts_with("--"))
        .last()
        .map_or(false, |word| word.ends_with(';'))
}

fn finish_section(section: Section, in_block: bool, buffer: &str) -> Result<(), String> {
    if in_block {
        return Err(format!("{:?} section ends inside StatementBegin", section));
    }
    if !buffer.trim().is_empty() {
        return Err(format!(
            "{:?} section ends with an unterminated statement (missing ';')",
            section
        ));
    }
    Ok(())
}

/// Turn a free-form migration name into a snake_case file-name suffix
fn normalize_name(name: &str) -> MigrateResult<String> {
    let mut normalized = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            normalized.push(ch.to_ascii_lowercase());
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    let normalized = normalized.trim_matches('_').to_string();

    if normalized.is_empty() {
        return Err(MigrateError::Source(
            "please provide a migration name".to_string(),
        ));
    }
    Ok(normalized)
}

fn migration_template(name: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- Created: {}\n\
         \n\
         -- +goose Up\n\
         -- +goose StatementBegin\n\
         SELECT 'up SQL query';\n\
         -- +goose StatementEnd\n\
         \n\
         -- +goose Down\n\
         -- +goose StatementBegin\n\
         SELECT 'down SQL query';\n\
         -- +goose StatementEnd\n",
        name,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
