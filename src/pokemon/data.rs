use super::{Ability, CardRecord};
use crate::{utils, CrawlerError, Item, Storage, Table};
use futures::TryStreamExt;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteRow},
    Row, SqlitePool,
};
use tracing::debug;

pub struct UrlTable {
    name: String,
    pool: SqlitePool,
}

#[async_trait::async_trait]
impl Table for UrlTable {
    type Record<'a> = &'a str;

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), CrawlerError> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                "CREATE TABLE {} (
                    id TEXT PRIMARY KEY,
                    created_at DATETIME
                 )",
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
            debug!("Created {}", self.name);
        }
        Ok(())
    }

    async fn insert<'a>(&self, record: Self::Record<'a>) -> Result<(), CrawlerError> {
        let query = format!(
            "INSERT OR IGNORE INTO {} (id, created_at) VALUES (?, ?)",
            &self.name
        );
        sqlx::query(&query)
            .bind(record)
            .bind(utils::get_now())
            .execute(self.get_pool())
            .await?;
        Ok(())
    }
}

/// One row per card url. Absent scalar fields are stored as NULL; nested
/// fields are stored as JSON text.
pub struct CardTable {
    name: String,
    pool: SqlitePool,
}

fn to_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, CrawlerError> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn from_json<T: serde::de::DeserializeOwned>(
    value: Option<String>,
) -> Result<Option<T>, CrawlerError> {
    Ok(value.as_deref().map(serde_json::from_str::<T>).transpose()?)
}

impl CardTable {
    fn from_row(row: &SqliteRow) -> Result<(String, CardRecord), CrawlerError> {
        let skills: String = row.try_get("skills")?;
        let record = CardRecord {
            title: row.try_get("title")?,
            card_type: row.try_get("card_type")?,
            hp: row.try_get("hp")?,
            pokemon_type: row.try_get("pokemon_type")?,
            evolves_from: row.try_get("evolves_from")?,
            skills: serde_json::from_str(&skills)?,
            expansion: row.try_get("expansion")?,
            name: row.try_get("name")?,
            illustrator: row.try_get("illustrator")?,
            poke_body: from_json::<Ability>(row.try_get("poke_body")?)?,
            poke_power: from_json::<Ability>(row.try_get("poke_power")?)?,
            weakness: row.try_get("weakness")?,
            resistance: row.try_get("resistance")?,
            retreat_cost: row.try_get("retreat_cost")?,
        };
        Ok((row.try_get("id")?, record))
    }

    /// All stored cards, ordered by url.
    pub async fn get_all(&self) -> Result<Vec<(String, CardRecord)>, CrawlerError> {
        let mut cards = vec![];
        let query = format!("SELECT * FROM {} ORDER BY id", self.name);
        let mut rows = sqlx::query(&query).fetch(self.get_pool());
        while let Some(row) = rows.try_next().await? {
            cards.push(Self::from_row(&row)?);
        }
        Ok(cards)
    }
}

#[async_trait::async_trait]
impl Table for CardTable {
    type Record<'a> = (&'a str, CardRecord);

    fn get_name(&self) -> &str {
        self.name.as_str()
    }

    fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create(&self) -> Result<(), CrawlerError> {
        if !utils::is_table_exists(self.get_pool(), &self.name).await? {
            let query = format!(
                r#"
                        CREATE TABLE {} (
                            id TEXT PRIMARY KEY,
                            created_at DATETIME,
                            title TEXT,
                            card_type TEXT,
                            hp TEXT,
                            pokemon_type TEXT,
                            evolves_from TEXT,
                            skills TEXT NOT NULL,
                            expansion TEXT,
                            name TEXT,
                            illustrator TEXT,
                            poke_body TEXT,
                            poke_power TEXT,
                            weakness TEXT,
                            resistance TEXT,
                            retreat_cost TEXT
                        )
                    "#,
                &self.name
            );
            sqlx::query(query.as_str()).execute(self.get_pool()).await?;
            debug!("Created {}", self.name);
        }
        Ok(())
    }

    async fn insert<'a>(&self, (url, record): Self::Record<'a>) -> Result<(), CrawlerError> {
        let skills = serde_json::to_string(&record.skills)?;
        let poke_body = to_json(record.poke_body.as_ref())?;
        let poke_power = to_json(record.poke_power.as_ref())?;

        let mut tx = self.get_pool().begin().await?;
        let query = format!(
            r#"INSERT OR REPLACE INTO {} (
                id,
                created_at,
                title,
                card_type,
                hp,
                pokemon_type,
                evolves_from,
                skills,
                expansion,
                name,
                illustrator,
                poke_body,
                poke_power,
                weakness,
                resistance,
                retreat_cost) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.name
        );
        sqlx::query(&query)
            .bind(url.trim())
            .bind(utils::get_now())
            .bind(record.title)
            .bind(record.card_type)
            .bind(record.hp)
            .bind(record.pokemon_type)
            .bind(record.evolves_from)
            .bind(skills)
            .bind(record.expansion)
            .bind(record.name)
            .bind(record.illustrator)
            .bind(poke_body)
            .bind(poke_power)
            .bind(record.weakness)
            .bind(record.resistance)
            .bind(record.retreat_cost)
            .execute(&mut tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Card storage for one crawl: `<prefix>_cards` and `<prefix>_warned`.
pub struct TcgData {
    pub name: String,
    pub cards: CardTable,
    pub warned: UrlTable,
}

impl TcgData {
    /// Opens (or creates) the SQLite file at `path`.
    pub async fn new(path: &str, prefix: &str) -> Result<TcgData, CrawlerError> {
        let opt = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opt).await?;
        Self::with_pool(pool, prefix).await
    }

    async fn with_pool(pool: SqlitePool, prefix: &str) -> Result<TcgData, CrawlerError> {
        let p = TcgData {
            name: prefix.to_string(),
            cards: CardTable {
                name: format!("{}_cards", prefix),
                pool: pool.clone(),
            },
            warned: UrlTable {
                name: format!("{}_warned", prefix),
                pool,
            },
        };

        p.cards.create().await?;
        p.warned.create().await?;

        Ok(p)
    }

    #[cfg(test)]
    pub(crate) async fn in_memory(prefix: &str) -> Result<TcgData, CrawlerError> {
        use sqlx::sqlite::SqlitePoolOptions;
        use std::str::FromStr;

        // Every connection to `:memory:` is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;
        Self::with_pool(pool, prefix).await
    }
}

#[async_trait::async_trait]
impl Storage for TcgData {
    type Record = CardRecord;

    async fn results_count(&self) -> Result<u32, CrawlerError> {
        self.cards.count().await
    }

    async fn results_insert<I: AsRef<str> + Send>(
        &self,
        (url, record): (I, CardRecord),
    ) -> Result<(), CrawlerError> {
        let url = url.as_ref();
        // A later complete scrape clears an earlier warning.
        if !record.is_incomplete() && self.warned.is_exist(url).await? {
            debug!("Clear warning for {}", url);
            self.warned.delete(url).await?;
        }
        self.cards.insert((url, record)).await
    }

    async fn warned_insert<I: AsRef<str> + Send>(&self, item: I) -> Result<(), CrawlerError> {
        self.warned.insert(item.as_ref()).await
    }
}
