use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use rusqlite::{Connection, OpenFlags, ToSql};

use crate::normalize::{Cell, FlatWeatherRow, SENTINEL};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS weather (
            id           INTEGER PRIMARY KEY,
            city_name    TEXT,
            country      TEXT,
            latitude     REAL,
            longitude    REAL,
            temperature  REAL,
            weather      TEXT,
            weather_desc TEXT,
            loaded_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_weather_city ON weather(city_name);
        ",
    )?;
    Ok(())
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(SqlValue::Null),
            Cell::Integer(i) => ToSqlOutput::from(*i),
            Cell::Real(f) => ToSqlOutput::from(*f),
            Cell::Text(s) => ToSqlOutput::from(s.as_str()),
            Cell::Default => ToSqlOutput::from(SENTINEL),
        })
    }
}

/// Append rows with one prepared INSERT, committed once.
pub fn insert_rows(conn: &Connection, rows: &[FlatWeatherRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO weather (city_name, country, latitude, longitude, temperature, weather, weather_desc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.city_name, r.country, r.latitude, r.longitude, r.temperature, r.weather, r.weather_desc,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn count_rows(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))?)
}

fn has_weather_table(conn: &Connection) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'weather'",
        [],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Destination for flattened rows.
pub trait RelationalTarget {
    /// Append `rows` in one transaction and return how many were inserted.
    fn load(&self, rows: &[FlatWeatherRow]) -> impl Future<Output = Result<usize>>;
    /// Rows in the `weather` table. A missing table counts as empty and is
    /// not created.
    fn count(&self) -> impl Future<Output = Result<i64>>;
}

/// The `weather` table in a local SQLite file. Holds only the location: a
/// connection is opened per call and closed when the call returns.
pub struct WeatherTable {
    path: PathBuf,
}

impl WeatherTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        WeatherTable { path: path.into() }
    }

    pub fn append(&self, rows: &[FlatWeatherRow]) -> Result<usize> {
        let conn = connect(&self.path)?;
        init_schema(&conn)?;
        insert_rows(&conn, rows)
    }

    /// Opened read-only, so counting never creates the file or the schema.
    pub fn row_count(&self) -> Result<i64> {
        if !self.path.exists() {
            return Ok(0);
        }
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open {:?} read-only", self.path))?;
        if !has_weather_table(&conn)? {
            return Ok(0);
        }
        count_rows(&conn)
    }
}

impl fmt::Display for WeatherTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl RelationalTarget for WeatherTable {
    async fn load(&self, rows: &[FlatWeatherRow]) -> Result<usize> {
        self.append(rows)
    }

    async fn count(&self) -> Result<i64> {
        self.row_count()
    }
}
