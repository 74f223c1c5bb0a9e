//! Read access to the media and link catalogs.
//!
//! The media database holds `images` and `videos`; the links database holds
//! `resources`. Both are plain SQLite files opened through libSQL.

use std::path::Path;

use libsql::{Connection, Database, params};
use mdenrich_shared::{AssetKind, CandidateAsset, EnrichError, Result};
use tracing::debug;

const MEDIA_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id          INTEGER PRIMARY KEY,
    url         TEXT NOT NULL,
    title       TEXT,
    description TEXT,
    tags        TEXT
);

CREATE TABLE IF NOT EXISTS videos (
    id          INTEGER PRIMARY KEY,
    url         TEXT NOT NULL,
    title       TEXT,
    description TEXT,
    tags        TEXT
);
"#;

const LINKS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS resources (
    id          INTEGER PRIMARY KEY,
    url         TEXT NOT NULL,
    title       TEXT,
    description TEXT,
    topic_tags  TEXT,
    type        TEXT
);
"#;

/// Media and link catalogs backed by two libSQL databases.
pub struct Catalog {
    #[allow(dead_code)]
    media_db: Database,
    #[allow(dead_code)]
    links_db: Database,
    media: Connection,
    links: Connection,
}

impl Catalog {
    /// Open existing catalog databases. Missing files are a configuration
    /// error rather than silently created empty databases.
    pub async fn open(media_path: &Path, links_path: &Path) -> Result<Self> {
        for path in [media_path, links_path] {
            if !path.exists() {
                return Err(EnrichError::config(format!(
                    "catalog database not found: {}",
                    path.display()
                )));
            }
        }
        Self::connect(media_path, links_path).await
    }

    /// Create (or reopen) catalog databases and ensure their tables exist.
    pub async fn create(media_path: &Path, links_path: &Path) -> Result<Self> {
        for path in [media_path, links_path] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| EnrichError::io(parent, e))?;
            }
        }
        let catalog = Self::connect(media_path, links_path).await?;
        catalog.create_schema().await?;
        Ok(catalog)
    }

    async fn connect(media_path: &Path, links_path: &Path) -> Result<Self> {
        let media_db = open_database(media_path).await?;
        let links_db = open_database(links_path).await?;
        let media = media_db
            .connect()
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        let links = links_db
            .connect()
            .map_err(|e| EnrichError::Storage(e.to_string()))?;
        Ok(Self {
            media_db,
            links_db,
            media,
            links,
        })
    }

    /// Create the `images`, `videos` and `resources` tables if absent.
    pub async fn create_schema(&self) -> Result<()> {
        self.media
            .execute_batch(MEDIA_SCHEMA)
            .await
            .map_err(|e| EnrichError::Storage(format!("media schema failed: {e}")))?;
        self.links
            .execute_batch(LINKS_SCHEMA)
            .await
            .map_err(|e| EnrichError::Storage(format!("links schema failed: {e}")))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// All images followed by all videos, each ordered by id.
    pub async fn media(&self) -> Result<Vec<CandidateAsset>> {
        let mut assets = self.read_media_table("images", AssetKind::Image).await?;
        assets.extend(self.read_media_table("videos", AssetKind::Video).await?);
        debug!(count = assets.len(), "loaded media catalog");
        Ok(assets)
    }

    /// All link resources ordered by id.
    pub async fn links(&self) -> Result<Vec<CandidateAsset>> {
        let mut rows = self
            .links
            .query(
                "SELECT id, url, title, description, topic_tags, type FROM resources ORDER BY id",
                params![],
            )
            .await
            .map_err(|e| EnrichError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let mut asset = row_to_asset(&row, AssetKind::Resource)?;
            asset.resource_type = row.get::<String>(5).ok().filter(|t| !t.trim().is_empty());
            results.push(asset);
        }
        debug!(count = results.len(), "loaded link catalog");
        Ok(results)
    }

    async fn read_media_table(&self, table: &str, kind: AssetKind) -> Result<Vec<CandidateAsset>> {
        let sql = format!("SELECT id, url, title, description, tags FROM {table} ORDER BY id");
        let mut rows = self
            .media
            .query(&sql, params![])
            .await
            .map_err(|e| EnrichError::Storage(format!("reading {table}: {e}")))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_asset(&row, kind)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    /// Insert an asset into the table matching its kind.
    pub async fn insert_asset(&self, asset: &CandidateAsset) -> Result<()> {
        let tags = asset.tags.join(", ");
        match asset.kind {
            AssetKind::Image | AssetKind::Video => {
                let table = if asset.kind == AssetKind::Image {
                    "images"
                } else {
                    "videos"
                };
                let sql = format!(
                    "INSERT INTO {table} (id, url, title, description, tags) VALUES (?1, ?2, ?3, ?4, ?5)"
                );
                self.media
                    .execute(
                        &sql,
                        params![
                            asset.id,
                            asset.url.as_str(),
                            asset.title.as_deref(),
                            asset.description.as_deref(),
                            tags.as_str(),
                        ],
                    )
                    .await
                    .map_err(|e| EnrichError::Storage(e.to_string()))?;
            }
            AssetKind::Resource => {
                self.links
                    .execute(
                        "INSERT INTO resources (id, url, title, description, topic_tags, type)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            asset.id,
                            asset.url.as_str(),
                            asset.title.as_deref(),
                            asset.description.as_deref(),
                            tags.as_str(),
                            asset.resource_type.as_deref(),
                        ],
                    )
                    .await
                    .map_err(|e| EnrichError::Storage(e.to_string()))?;
            }
        }
        Ok(())
    }
}

async fn open_database(path: &Path) -> Result<Database> {
    libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| EnrichError::Storage(format!("{}: {e}", path.display())))
}

/// Map the shared `id, url, title, description, tags` prefix of a row.
fn row_to_asset(row: &libsql::Row, kind: AssetKind) -> Result<CandidateAsset> {
    Ok(CandidateAsset {
        id: row
            .get::<i64>(0)
            .map_err(|e| EnrichError::Storage(e.to_string()))?,
        kind,
        url: row
            .get::<String>(1)
            .map_err(|e| EnrichError::Storage(e.to_string()))?,
        title: row.get::<String>(2).ok(),
        description: row.get::<String>(3).ok(),
        tags: row
            .get::<String>(4)
            .map(|raw| split_tags(&raw))
            .unwrap_or_default(),
        resource_type: None,
    })
}

/// Split a comma/semicolon separated tag column.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_paths() -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("mdenrich_catalog_{}", Uuid::now_v7()));
        (dir.join("media.db"), dir.join("links.db"))
    }

    fn asset(id: i64, kind: AssetKind, url: &str) -> CandidateAsset {
        CandidateAsset {
            id,
            kind,
            url: url.into(),
            title: Some(format!("Asset {id}")),
            description: None,
            tags: vec!["carbon capture".into(), "storage".into()],
            resource_type: None,
        }
    }

    #[test]
    fn split_tags_handles_both_separators() {
        assert_eq!(
            split_tags("dac; storage , , co2"),
            vec!["dac", "storage", "co2"]
        );
        assert!(split_tags("  ").is_empty());
    }

    #[tokio::test]
    async fn open_rejects_missing_files() {
        let (media, links) = temp_paths();
        let err = Catalog::open(&media, &links).await.err().expect("missing db");
        assert!(matches!(err, EnrichError::Config { .. }));
    }

    #[tokio::test]
    async fn media_lists_images_before_videos() {
        let (media, links) = temp_paths();
        let catalog = Catalog::create(&media, &links).await.expect("create");
        catalog
            .insert_asset(&asset(7, AssetKind::Video, "https://v.example/clip"))
            .await
            .unwrap();
        catalog
            .insert_asset(&asset(2, AssetKind::Image, "https://i.example/b.jpg"))
            .await
            .unwrap();
        catalog
            .insert_asset(&asset(1, AssetKind::Image, "https://i.example/a.jpg"))
            .await
            .unwrap();
        drop(catalog);

        let catalog = Catalog::open(&media, &links).await.expect("reopen");
        let assets = catalog.media().await.unwrap();
        let ids: Vec<i64> = assets.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 7]);
        assert_eq!(assets[2].kind, AssetKind::Video);
        assert_eq!(assets[0].tags, vec!["carbon capture", "storage"]);
        assert_eq!(assets[0].title.as_deref(), Some("Asset 1"));
        assert!(assets[0].description.is_none());
    }

    #[tokio::test]
    async fn links_carry_resource_type() {
        let (media, links) = temp_paths();
        let catalog = Catalog::create(&media, &links).await.expect("create");
        let mut report = asset(3, AssetKind::Resource, "https://r.example/report");
        report.resource_type = Some("report".into());
        catalog.insert_asset(&report).await.unwrap();
        catalog
            .insert_asset(&asset(4, AssetKind::Resource, "https://r.example/page"))
            .await
            .unwrap();

        let resources = catalog.links().await.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, AssetKind::Resource);
        assert_eq!(resources[0].resource_type.as_deref(), Some("report"));
        assert!(resources[1].resource_type.is_none());
    }
}
