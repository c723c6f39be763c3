use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::db::RelationalTarget;
use crate::docstore::DocumentStore;

/// Placeholder for any field whose source path is missing.
pub const SENTINEL: &str = "Default Value";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    Key(&'static str),
    Index(usize),
}

use Step::{Index, Key};

const CITY_NAME: &[Step] = &[Key("name")];
const COUNTRY: &[Step] = &[Key("sys"), Key("country")];
const LATITUDE: &[Step] = &[Key("coord"), Key("lat")];
const LONGITUDE: &[Step] = &[Key("coord"), Key("lon")];
const TEMPERATURE: &[Step] = &[Key("main"), Key("temp")];
const WEATHER: &[Step] = &[Key("weather"), Index(0), Key("main")];
const WEATHER_DESC: &[Step] = &[Key("weather"), Index(0), Key("description")];

/// Follow `path` through nested objects and arrays. `None` as soon as a key
/// is absent, an index is out of range, or a node has the wrong shape.
pub fn lookup<'a>(root: &'a Value, path: &[Step]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, step| match step {
        Key(key) => node.as_object()?.get(*key),
        Index(idx) => node.as_array()?.get(*idx),
    })
}

/// One relational column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// The path was missing; stored as [`SENTINEL`].
    Default,
}

impl Cell {
    fn at(document: &Value, path: &[Step]) -> Cell {
        match lookup(document, path) {
            None => Cell::Default,
            Some(Value::Null) => Cell::Null,
            Some(Value::Bool(b)) => Cell::Integer(i64::from(*b)),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(i) => Cell::Integer(i),
                None => n.as_f64().map_or(Cell::Null, Cell::Real),
            },
            Some(Value::String(s)) => Cell::Text(s.clone()),
            Some(other) => Cell::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatWeatherRow {
    pub city_name: Cell,
    pub country: Cell,
    pub latitude: Cell,
    pub longitude: Cell,
    pub temperature: Cell,
    pub weather: Cell,
    pub weather_desc: Cell,
}

impl FlatWeatherRow {
    pub fn from_document(document: &Value) -> Self {
        FlatWeatherRow {
            city_name: Cell::at(document, CITY_NAME),
            country: Cell::at(document, COUNTRY),
            latitude: Cell::at(document, LATITUDE),
            longitude: Cell::at(document, LONGITUDE),
            temperature: Cell::at(document, TEMPERATURE),
            weather: Cell::at(document, WEATHER),
            weather_desc: Cell::at(document, WEATHER_DESC),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOutcome {
    Loaded(usize),
    Nothing,
}

/// Flatten every stored document and append the rows to the weather table.
///
/// There is no dedup: extracting twice from an unchanged store loads every
/// row twice.
pub async fn extract<D, T>(source: &D, target: &T) -> Result<LoadOutcome>
where
    D: DocumentStore,
    T: RelationalTarget,
{
    let documents = source.find_all().await.context("Failed to read documents")?;
    info!("Read {} documents from the document store", documents.len());

    let rows: Vec<FlatWeatherRow> = documents.iter().map(FlatWeatherRow::from_document).collect();
    for row in &rows {
        debug!(?row, "Flattened");
    }

    if rows.is_empty() {
        info!("Nothing to load");
        return Ok(LoadOutcome::Nothing);
    }

    let loaded = target.load(&rows).await?;
    info!("Loaded {} rows into the weather table", loaded);
    Ok(LoadOutcome::Loaded(loaded))
}

// ── Tests ──
