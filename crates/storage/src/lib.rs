use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Device-local store: keyed JSON records plus the cookie jar.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("strict") {
            Self::Strict
        } else if raw.eq_ignore_ascii_case("none") {
            Self::None
        } else {
            Self::Lax
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub expires_at: DateTime<Utc>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Number of keyed records. Doubles as a readability check after opening.
    pub async fn record_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM local_records")
            .fetch_one(&self.pool)
            .await
            .context("local store is not readable")
    }

    /// Flushes and closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn load_record(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_records WHERE record_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read local record '{key}'"))?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn save_record(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_records (record_key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(record_key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write local record '{key}'"))?;
        Ok(())
    }

    pub async fn set_cookie(&self, cookie: &StoredCookie) -> Result<()> {
        sqlx::query(
            "INSERT INTO cookies (name, value, path, expires_at, secure, same_site, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(name) DO UPDATE SET
                value = excluded.value,
                path = excluded.path,
                expires_at = excluded.expires_at,
                secure = excluded.secure,
                same_site = excluded.same_site,
                updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&cookie.name)
        .bind(&cookie.value)
        .bind(&cookie.path)
        .bind(cookie.expires_at)
        .bind(cookie.secure)
        .bind(cookie.same_site.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write cookie '{}'", cookie.name))?;
        Ok(())
    }

    /// Returns the cookie unless it is missing or already expired.
    pub async fn cookie(&self, name: &str) -> Result<Option<StoredCookie>> {
        let row = sqlx::query(
            "SELECT name, value, path, expires_at, secure, same_site FROM cookies WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to read cookie '{name}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let cookie = cookie_from_row(&row)?;
        if cookie.expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(cookie))
    }

    pub async fn list_cookies(&self) -> Result<Vec<StoredCookie>> {
        let rows = sqlx::query(
            "SELECT name, value, path, expires_at, secure, same_site FROM cookies ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list cookies")?;

        let now = Utc::now();
        let mut cookies = Vec::with_capacity(rows.len());
        for row in &rows {
            let cookie = cookie_from_row(row)?;
            if cookie.expires_at > now {
                cookies.push(cookie);
            }
        }
        Ok(cookies)
    }
}

fn cookie_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredCookie> {
    let same_site: String = row.try_get("same_site")?;
    Ok(StoredCookie {
        name: row.try_get("name")?,
        value: row.try_get("value")?,
        path: row.try_get("path")?,
        expires_at: row.try_get("expires_at")?,
        secure: row.try_get("secure")?,
        same_site: SameSite::parse(&same_site),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
