use thiserror::Error;

/// Failures while reading a city listing page.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no city table on {url}")]
    MissingTable { url: String },
    #[error("row {row} on {url} has {found} cells, expected at least {expected}")]
    MissingColumn {
        url: String,
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("bad {field} {text:?} in row {row} on {url}")]
    Coordinate {
        url: String,
        row: usize,
        field: &'static str,
        text: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weather response is not a JSON object: {0}")]
    Document(String),
    #[error("weather response could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("document conversion: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),
}
