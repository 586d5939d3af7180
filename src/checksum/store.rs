//! SQLite persistence for registered instances and their per-version
//! file hashes.
//!
//! Deleting an instance removes its versions and their records.
//! Every batch write runs inside one transaction: it commits whole or not
//! at all. Replacing a record deletes and re-inserts it, so a reader never
//! sees two hashes for one path.

use camino::Utf8Path;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info};

use super::{ChecksumError, ChecksumMap, FileChecksum};
use crate::instance::Instance;

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;
CREATE TABLE IF NOT EXISTS instance (
    instance_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    webroot TEXT NOT NULL,
    web_url TEXT NOT NULL,
    access_type TEXT NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    user TEXT NOT NULL,
    password TEXT,
    identity_file TEXT,
    interpreter TEXT NOT NULL,
    temp_dir TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS version (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id TEXT NOT NULL REFERENCES instance(instance_id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS file (
    version_id INTEGER NOT NULL REFERENCES version(version_id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    hash TEXT NOT NULL,
    UNIQUE (version_id, path)
);
";

const INSTANCE_COLUMNS: &str = "instance_id, name, webroot, web_url, access_type, host, port, \
     user, password, identity_file, interpreter, temp_dir";

const UPSERT_INSTANCE: &str = "INSERT INTO instance (instance_id, name, webroot, web_url, \
     access_type, host, port, user, password, identity_file, interpreter, temp_dir) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
     ON CONFLICT (instance_id) DO UPDATE SET name = excluded.name, \
     webroot = excluded.webroot, web_url = excluded.web_url, \
     access_type = excluded.access_type, host = excluded.host, port = excluded.port, \
     user = excluded.user, password = excluded.password, \
     identity_file = excluded.identity_file, interpreter = excluded.interpreter, \
     temp_dir = excluded.temp_dir";

/// A tracked release or snapshot of an instance's codebase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Version {
    /// Store-assigned identifier.
    pub id: i64,
    /// Instance the version belongs to.
    pub instance_id: String,
    /// Human readable label, such as a tag or release name.
    pub label: String,
}

/// Relational store of baselines.
#[derive(Debug)]
pub struct ChecksumStore {
    conn: Connection,
}

impl ChecksumStore {
    /// Opens or creates the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the database cannot be opened
    /// or the schema cannot be applied.
    pub fn open(path: &Utf8Path) -> Result<Self, ChecksumError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when SQLite cannot be initialised.
    pub fn open_in_memory() -> Result<Self, ChecksumError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ChecksumError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Registers `instance`, replacing the stored description when the id
    /// is already known. Its versions are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the write fails.
    pub fn save_instance(&self, instance: &Instance) -> Result<(), ChecksumError> {
        upsert_instance(&self.conn, instance)?;
        info!(instance = %instance.id, access = %instance.access_type, "saved instance");
        Ok(())
    }

    /// Loads the instance registered as `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the query fails, or
    /// [`ChecksumError::Instance`] when the stored row no longer validates.
    pub fn instance(&self, instance_id: &str) -> Result<Option<Instance>, ChecksumError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instance WHERE instance_id = ?1"),
                params![instance_id],
                InstanceRow::read,
            )
            .optional()?;
        row.map(InstanceRow::into_instance).transpose()
    }

    /// Lists registered instances ordered by id.
    ///
    /// # Errors
    ///
    /// See [`Self::instance`].
    pub fn instances(&self) -> Result<Vec<Instance>, ChecksumError> {
        let mut statement = self
            .conn
            .prepare(&format!("SELECT {INSTANCE_COLUMNS} FROM instance ORDER BY instance_id"))?;
        let rows = statement
            .query_map([], InstanceRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(InstanceRow::into_instance).collect()
    }

    /// Deletes `instance_id` together with its versions and file records.
    /// Returns `false` when no such instance was registered.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the delete fails.
    pub fn delete_instance(&self, instance_id: &str) -> Result<bool, ChecksumError> {
        let removed = self
            .conn
            .execute("DELETE FROM instance WHERE instance_id = ?1", params![instance_id])?;
        if removed > 0 {
            info!(instance = instance_id, "deleted instance");
        }
        Ok(removed > 0)
    }

    /// Registers a new version for `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownInstance`] when the instance is not
    /// registered, or [`ChecksumError::Store`] when the insert fails.
    pub fn create_version(&self, instance_id: &str, label: &str) -> Result<Version, ChecksumError> {
        insert_version(&self.conn, instance_id, label)
    }

    /// Registers `instance` if needed, then creates version `label` holding
    /// `entries`, all in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when any write fails, including a
    /// path listed twice; neither the version nor any record is kept then.
    pub fn create_baseline<I>(
        &mut self,
        instance: &Instance,
        label: &str,
        entries: I,
    ) -> Result<Version, ChecksumError>
    where
        I: IntoIterator<Item = FileChecksum>,
    {
        let tx = self.conn.transaction()?;
        upsert_instance(&tx, instance)?;
        let version = insert_version(&tx, &instance.id, label)?;
        let mut written = 0;
        {
            let mut insert =
                tx.prepare("INSERT INTO file (version_id, path, hash) VALUES (?1, ?2, ?3)")?;
            for entry in entries {
                insert.execute(params![version.id, entry.path, entry.hash])?;
                written += 1;
            }
        }
        tx.commit()?;
        debug!(version = version.id, written, "recorded baseline");
        Ok(version)
    }

    /// Looks up a version by id.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the query fails.
    pub fn version(&self, version_id: i64) -> Result<Option<Version>, ChecksumError> {
        let version = self
            .conn
            .query_row(
                "SELECT version_id, instance_id, label FROM version WHERE version_id = ?1",
                params![version_id],
                |row| {
                    Ok(Version {
                        id: row.get(0)?,
                        instance_id: row.get(1)?,
                        label: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(version)
    }

    /// Returns the most recently created version of `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the query fails.
    pub fn latest_version(&self, instance_id: &str) -> Result<Option<Version>, ChecksumError> {
        let version = self
            .conn
            .query_row(
                "SELECT version_id, instance_id, label FROM version
                 WHERE instance_id = ?1 ORDER BY version_id DESC LIMIT 1",
                params![instance_id],
                |row| {
                    Ok(Version {
                        id: row.get(0)?,
                        instance_id: row.get(1)?,
                        label: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(version)
    }

    /// Returns `true` when any file record exists for `version_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the query fails.
    pub fn has_checksums(&self, version_id: i64) -> Result<bool, ChecksumError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM file WHERE version_id = ?1 LIMIT 1",
                params![version_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Loads the baseline of `version_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when the query fails.
    pub fn get_checksums(&self, version_id: i64) -> Result<ChecksumMap, ChecksumError> {
        let mut statement = self
            .conn
            .prepare("SELECT path, hash FROM file WHERE version_id = ?1")?;
        let rows = statement.query_map(params![version_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = ChecksumMap::new();
        for row in rows {
            let (path, hash) = row?;
            map.insert(path, hash);
        }
        Ok(map)
    }

    /// Replaces the whole baseline of `version_id` with `entries`.
    ///
    /// When `entries` lists a path more than once the last record wins.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownVersion`] for a missing version, or
    /// [`ChecksumError::Store`] when the batch is rolled back.
    pub fn save_checksums<I>(&mut self, version_id: i64, entries: I) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = FileChecksum>,
    {
        let tx = self.begin(version_id)?;
        tx.execute("DELETE FROM file WHERE version_id = ?1", params![version_id])?;
        let written = replace_each(&tx, version_id, entries)?;
        tx.commit()?;
        debug!(version = version_id, written, "saved checksums");
        Ok(written)
    }

    /// Inserts records that must not already exist for `version_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Store`] when any path is already present;
    /// nothing from the batch is kept in that case.
    pub fn add_files<I>(&mut self, version_id: i64, entries: I) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = FileChecksum>,
    {
        let tx = self.begin(version_id)?;
        let mut written = 0;
        {
            let mut insert =
                tx.prepare("INSERT INTO file (version_id, path, hash) VALUES (?1, ?2, ?3)")?;
            for entry in entries {
                insert.execute(params![version_id, entry.path, entry.hash])?;
                written += 1;
            }
        }
        tx.commit()?;
        debug!(version = version_id, written, "added checksums");
        Ok(written)
    }

    /// Deletes and re-inserts each record, creating missing ones.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownVersion`] for a missing version, or
    /// [`ChecksumError::Store`] when the batch is rolled back.
    pub fn replace_files<I>(&mut self, version_id: i64, entries: I) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = FileChecksum>,
    {
        let tx = self.begin(version_id)?;
        let written = replace_each(&tx, version_id, entries)?;
        tx.commit()?;
        debug!(version = version_id, written, "replaced checksums");
        Ok(written)
    }

    /// Replaces a single record.
    ///
    /// # Errors
    ///
    /// See [`Self::replace_files`].
    pub fn replace_file(
        &mut self,
        version_id: i64,
        hash: &str,
        path: &str,
    ) -> Result<(), ChecksumError> {
        self.replace_files(version_id, [FileChecksum::new(hash, path)])
            .map(|_| ())
    }

    /// Removes the records for `paths`; absent paths are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownVersion`] for a missing version, or
    /// [`ChecksumError::Store`] when the batch is rolled back.
    pub fn remove_files<I, P>(&mut self, version_id: i64, paths: I) -> Result<usize, ChecksumError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let tx = self.begin(version_id)?;
        let mut removed = 0;
        {
            let mut delete = tx.prepare("DELETE FROM file WHERE version_id = ?1 AND path = ?2")?;
            for path in paths {
                removed += delete.execute(params![version_id, path.as_ref()])?;
            }
        }
        tx.commit()?;
        debug!(version = version_id, removed, "removed checksums");
        Ok(removed)
    }

    /// Removes one record.
    ///
    /// # Errors
    ///
    /// See [`Self::remove_files`].
    pub fn remove_file(&mut self, version_id: i64, path: &str) -> Result<(), ChecksumError> {
        self.remove_files(version_id, [path]).map(|_| ())
    }

    /// Seeds `to_version` with every record of `from_version`, replacing
    /// whatever `to_version` held.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::UnknownVersion`] when either version is
    /// missing, or [`ChecksumError::Store`] when the copy is rolled back.
    pub fn copy_checksums(
        &mut self,
        from_version: i64,
        to_version: i64,
    ) -> Result<usize, ChecksumError> {
        let tx = self.begin(to_version)?;
        ensure_version(&tx, from_version)?;
        tx.execute("DELETE FROM file WHERE version_id = ?1", params![to_version])?;
        let copied = tx.execute(
            "INSERT INTO file (version_id, path, hash)
             SELECT ?2, path, hash FROM file WHERE version_id = ?1",
            params![from_version, to_version],
        )?;
        tx.commit()?;
        info!(from = from_version, to = to_version, copied, "copied checksums");
        Ok(copied)
    }

    fn begin(&mut self, version_id: i64) -> Result<Transaction<'_>, ChecksumError> {
        let tx = self.conn.transaction()?;
        ensure_version(&tx, version_id)?;
        Ok(tx)
    }
}

fn upsert_instance(conn: &Connection, instance: &Instance) -> Result<(), ChecksumError> {
    let connection = &instance.connection;
    conn.execute(
        UPSERT_INSTANCE,
        params![
            instance.id,
            instance.name,
            instance.webroot.as_str(),
            instance.web_url,
            instance.access_type.as_str(),
            connection.host,
            connection.port,
            connection.user,
            connection.password,
            connection.identity_file,
            instance.interpreter,
            instance.temp_dir.as_str(),
        ],
    )?;
    Ok(())
}

fn insert_version(
    conn: &Connection,
    instance_id: &str,
    label: &str,
) -> Result<Version, ChecksumError> {
    let known: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM instance WHERE instance_id = ?1",
            params![instance_id],
            |row| row.get(0),
        )
        .optional()?;
    if known.is_none() {
        return Err(ChecksumError::UnknownInstance {
            instance_id: instance_id.to_owned(),
        });
    }
    conn.execute(
        "INSERT INTO version (instance_id, label) VALUES (?1, ?2)",
        params![instance_id, label],
    )?;
    let version = Version {
        id: conn.last_insert_rowid(),
        instance_id: instance_id.to_owned(),
        label: label.to_owned(),
    };
    info!(version = version.id, instance = instance_id, label, "created checksum version");
    Ok(version)
}

/// Raw `instance` row, validated by rebuilding through the builder.
struct InstanceRow {
    id: String,
    name: String,
    webroot: String,
    web_url: String,
    access_type: String,
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    identity_file: Option<String>,
    interpreter: String,
    temp_dir: String,
}

impl InstanceRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            webroot: row.get(2)?,
            web_url: row.get(3)?,
            access_type: row.get(4)?,
            host: row.get(5)?,
            port: row.get(6)?,
            user: row.get(7)?,
            password: row.get(8)?,
            identity_file: row.get(9)?,
            interpreter: row.get(10)?,
            temp_dir: row.get(11)?,
        })
    }

    fn into_instance(self) -> Result<Instance, ChecksumError> {
        let instance = Instance::builder()
            .id(self.id)
            .name(self.name)
            .webroot(self.webroot)
            .web_url(self.web_url)
            .access_type(self.access_type.parse()?)
            .host(self.host)
            .port(self.port)
            .user(self.user)
            .password(self.password)
            .identity_file(self.identity_file)
            .interpreter(self.interpreter)
            .temp_dir(self.temp_dir)
            .build()?;
        Ok(instance)
    }
}

fn ensure_version(tx: &Transaction<'_>, version_id: i64) -> Result<(), ChecksumError> {
    let found: Option<i64> = tx
        .query_row(
            "SELECT version_id FROM version WHERE version_id = ?1",
            params![version_id],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(ChecksumError::UnknownVersion { version_id });
    }
    Ok(())
}

fn replace_each<I>(
    tx: &Transaction<'_>,
    version_id: i64,
    entries: I,
) -> Result<usize, ChecksumError>
where
    I: IntoIterator<Item = FileChecksum>,
{
    let mut delete = tx.prepare("DELETE FROM file WHERE version_id = ?1 AND path = ?2")?;
    let mut insert = tx.prepare("INSERT INTO file (version_id, path, hash) VALUES (?1, ?2, ?3)")?;
    let mut written = 0;
    for entry in entries {
        delete.execute(params![version_id, entry.path])?;
        insert.execute(params![version_id, entry.path, entry.hash])?;
        written += 1;
    }
    Ok(written)
}
