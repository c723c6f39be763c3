use std::fmt;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::db::RelationalTarget;
use crate::normalize::{Cell, FlatWeatherRow, SENTINEL};

// Every data column is TEXT: a missing path is stored as the sentinel string,
// which has to fit the numeric columns too.
const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS weather (
        id           BIGSERIAL PRIMARY KEY,
        city_name    TEXT,
        country      TEXT,
        latitude     TEXT,
        longitude    TEXT,
        temperature  TEXT,
        weather      TEXT,
        weather_desc TEXT,
        loaded_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE INDEX IF NOT EXISTS idx_weather_city ON weather(city_name);
";

const INSERT_ROW: &str =
    "INSERT INTO weather (city_name, country, latitude, longitude, temperature, weather, weather_desc)
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

/// Where the relational server lives and who to log in as.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerAddress {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// The `weather` table on a Postgres server. A connection is opened per call
/// and closed before the call returns.
pub struct PgWeatherTable {
    address: ServerAddress,
}

impl PgWeatherTable {
    pub fn new(address: ServerAddress) -> Self {
        PgWeatherTable { address }
    }

    fn config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .user(self.address.user.as_str())
            .password(self.address.password.as_str())
            .host(self.address.host.as_str())
            .port(self.address.port)
            .dbname(self.address.database.as_str());
        config
    }

    async fn connect(&self) -> Result<(Client, JoinHandle<()>)> {
        let (client, connection) = self
            .config()
            .connect(NoTls)
            .await
            .with_context(|| format!("Failed to connect to {}", self.address))?;
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("relational connection error: {err}");
            }
        });
        debug!("Connected to {}", self.address);
        Ok((client, driver))
    }
}

async fn close(client: Client, driver: JoinHandle<()>) -> Result<()> {
    drop(client);
    driver.await.context("Relational connection task failed")
}

impl fmt::Display for PgWeatherTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgres://{}", self.address)
    }
}

/// Text form of a cell for a TEXT column. Only a JSON null stays NULL.
fn text_value(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Null => None,
        Cell::Integer(i) => Some(i.to_string()),
        Cell::Real(f) => Some(f.to_string()),
        Cell::Text(s) => Some(s.clone()),
        Cell::Default => Some(SENTINEL.to_string()),
    }
}

fn row_values(row: &FlatWeatherRow) -> [Option<String>; 7] {
    [
        text_value(&row.city_name),
        text_value(&row.country),
        text_value(&row.latitude),
        text_value(&row.longitude),
        text_value(&row.temperature),
        text_value(&row.weather),
        text_value(&row.weather_desc),
    ]
}

impl RelationalTarget for PgWeatherTable {
    async fn load(&self, rows: &[FlatWeatherRow]) -> Result<usize> {
        let (mut client, driver) = self.connect().await?;
        client
            .batch_execute(CREATE_TABLE)
            .await
            .context("Failed to create the weather table")?;

        let tx = client.transaction().await?;
        let statement = tx.prepare(INSERT_ROW).await?;
        let mut count = 0u64;
        for (i, row) in rows.iter().enumerate() {
            let values = row_values(row);
            let params: Vec<&(dyn ToSql + Sync)> =
                values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            count += tx
                .execute(&statement, &params[..])
                .await
                .with_context(|| format!("Failed to insert row {}", i))?;
        }
        tx.commit().await.context("Failed to commit the weather rows")?;

        close(client, driver).await?;
        Ok(count as usize)
    }

    async fn count(&self) -> Result<i64> {
        let (client, driver) = self.connect().await?;
        let exists: bool = client
            .query_one("SELECT to_regclass('weather') IS NOT NULL", &[])
            .await?
            .get(0);
        let rows: i64 = if exists {
            client.query_one("SELECT COUNT(*) FROM weather", &[]).await?.get(0)
        } else {
            0
        };
        close(client, driver).await?;
        Ok(rows)
    }
}
