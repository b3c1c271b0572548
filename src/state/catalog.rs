use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data::{NewSlide, NewSlideCziTif, Slide, SlideCziTif};
use super::schema::{SLIDE, SLIDE_CZI_TO_TIF, SLIDE_CZI_TO_TIF_SLIDE_INDEX};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

const IN_MEMORY: &str = ":memory:";

/// The Catalog manages the SQLite database of slides and their
/// CZI to TIFF scene extractions.
///
/// A `Catalog` owns a single connection. `rusqlite::Connection` is not `Sync`,
/// so worker threads open their own `Catalog` on the same path.
pub struct Catalog {
    conn: Connection,
    db_path: PathBuf,
}

impl Catalog {
    /// Open (or create) the catalog described by `config`.
    ///
    /// The parent directory of the database file is created if needed.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        let db_path = config.database_path.clone();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let catalog = Self::with_connection(conn, db_path, config)?;

        tracing::info!("Catalog opened at {}", catalog.db_path.display());
        Ok(catalog)
    }

    /// A private in-memory catalog, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, PathBuf::from(IN_MEMORY), &CatalogConfig::default())
    }

    fn with_connection(conn: Connection, db_path: PathBuf, config: &CatalogConfig) -> Result<Self> {
        // Foreign keys are off by default in SQLite and are per connection
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let catalog = Catalog { conn, db_path };
        catalog.init_schema()?;
        Ok(catalog)
    }

    /// Create all tables and indexes if they don't exist
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(&SLIDE.create_sql())?;
        self.conn.execute_batch(&SLIDE_CZI_TO_TIF.create_sql())?;
        self.conn.execute_batch(SLIDE_CZI_TO_TIF_SLIDE_INDEX)?;

        tracing::debug!("Catalog schema initialized");
        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // ========== Slides ==========

    pub fn create_slide(&self, new: &NewSlide) -> Result<Slide> {
        self.conn.execute(
            "INSERT INTO slide (file_name, created) VALUES (?1, ?2)",
            params![new.file_name, Utc::now().timestamp()],
        )?;
        let id = self.conn.last_insert_rowid();

        tracing::debug!(slide_id = id, file_name = %new.file_name, "Slide created");
        self.slide(id)
    }

    pub fn slide(&self, id: i64) -> Result<Slide> {
        let sql = format!("SELECT {} FROM slide WHERE id = ?1", SLIDE.column_list());
        self.conn
            .query_row(&sql, [id], slide_from_row)
            .optional()
            .map_err(CatalogError::from_read)?
            .ok_or(CatalogError::NotFound {
                table: SLIDE.name,
                id,
            })
    }

    /// All slides, oldest first
    pub fn slides(&self) -> Result<Vec<Slide>> {
        let sql = format!("SELECT {} FROM slide ORDER BY id", SLIDE.column_list());
        let mut stmt = self.conn.prepare(&sql)?;

        let slides = stmt
            .query_map([], slide_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from_read)?;
        Ok(slides)
    }

    /// Delete a slide. Its scene extractions are removed with it.
    pub fn delete_slide(&self, id: i64) -> Result<()> {
        let scenes: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM slide_czi_to_tif WHERE slide_id = ?1",
            [id],
            |row| row.get(0),
        )?;

        let deleted = self.conn.execute("DELETE FROM slide WHERE id = ?1", [id])?;
        if deleted == 0 {
            return Err(CatalogError::NotFound {
                table: SLIDE.name,
                id,
            });
        }

        tracing::info!(slide_id = id, scenes, "Slide deleted");
        Ok(())
    }

    pub fn slide_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM slide", [], |row| row.get(0))?;
        Ok(count)
    }

    // ========== Scene extractions ==========

    /// Record a new scene/channel extraction and return the stored row.
    ///
    /// Fails with `ReferentialIntegrity` if `new.slide_id` names no slide.
    pub fn create_czi_tif(&self, new: &NewSlideCziTif) -> Result<SlideCziTif> {
        check_file_size(new.file_size)?;

        self.conn
            .execute(
                "INSERT INTO slide_czi_to_tif
                    (slide_id, scene_number, channel, width, height, file_name, file_size, comments, created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    new.slide_id,
                    new.scene_number,
                    new.channel,
                    new.width,
                    new.height,
                    new.file_name,
                    new.file_size,
                    new.comments,
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| CatalogError::from_write(e, new.slide_id))?;
        let id = self.conn.last_insert_rowid();

        tracing::debug!(
            id,
            slide_id = new.slide_id,
            scene = ?new.scene_number,
            channel = ?new.channel,
            "Scene extraction recorded"
        );
        self.czi_tif(id)
    }

    pub fn czi_tif(&self, id: i64) -> Result<SlideCziTif> {
        fetch_czi_tif(&self.conn, id)
    }

    /// Overwrite every field of an existing row except `id` and `created`.
    ///
    /// Changing `slide_id` moves the row to another slide, which must exist.
    pub fn update_czi_tif(&self, record: &SlideCziTif) -> Result<()> {
        write_czi_tif(&self.conn, record)
    }

    /// Read-modify-write a row under the database write lock.
    ///
    /// Changes `f` makes to `id` or `created` are ignored.
    pub fn modify_czi_tif<F>(&mut self, id: i64, f: F) -> Result<SlideCziTif>
    where
        F: FnOnce(&mut SlideCziTif),
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut record = fetch_czi_tif(&tx, id)?;
        let created = record.created;
        f(&mut record);
        record.id = id;
        record.created = created;

        write_czi_tif(&tx, &record)?;
        tx.commit()?;

        Ok(record)
    }

    pub fn set_czi_tif_comments(&self, id: i64, comments: Option<&str>) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE slide_czi_to_tif SET comments = ?1 WHERE id = ?2",
            params![comments, id],
        )?;
        require_row(updated, id)
    }

    pub fn set_czi_tif_active(&self, id: i64, active: bool) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE slide_czi_to_tif SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        require_row(updated, id)
    }

    pub fn delete_czi_tif(&self, id: i64) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM slide_czi_to_tif WHERE id = ?1", [id])?;
        require_row(deleted, id)?;

        tracing::debug!(id, "Scene extraction deleted");
        Ok(())
    }

    /// Extractions of one slide ordered by scene then channel.
    /// An unknown slide simply has none.
    pub fn czi_tifs_for_slide(&self, slide_id: i64) -> Result<Vec<SlideCziTif>> {
        let sql = format!(
            "SELECT {} FROM slide_czi_to_tif
             WHERE slide_id = ?1
             ORDER BY scene_number, channel, id",
            SLIDE_CZI_TO_TIF.column_list()
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let records = stmt
            .query_map([slide_id], czi_tif_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(CatalogError::from_read)?;
        Ok(records)
    }

    /// The slide a scene extraction was taken from
    pub fn slide_for(&self, record: &SlideCziTif) -> Result<Slide> {
        self.slide(record.slide_id)
    }

    pub fn czi_tif_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM slide_czi_to_tif", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn fetch_czi_tif(conn: &Connection, id: i64) -> Result<SlideCziTif> {
    let sql = format!(
        "SELECT {} FROM slide_czi_to_tif WHERE id = ?1",
        SLIDE_CZI_TO_TIF.column_list()
    );
    conn.query_row(&sql, [id], czi_tif_from_row)
        .optional()
        .map_err(CatalogError::from_read)?
        .ok_or(CatalogError::NotFound {
            table: SLIDE_CZI_TO_TIF.name,
            id,
        })
}

fn write_czi_tif(conn: &Connection, record: &SlideCziTif) -> Result<()> {
    check_file_size(record.file_size)?;

    let updated = conn
        .execute(
            "UPDATE slide_czi_to_tif SET
                slide_id = ?1, scene_number = ?2, channel = ?3, width = ?4, height = ?5,
                file_name = ?6, file_size = ?7, comments = ?8, active = ?9
             WHERE id = ?10",
            params![
                record.slide_id,
                record.scene_number,
                record.channel,
                record.width,
                record.height,
                record.file_name,
                record.file_size,
                record.comments,
                record.active,
                record.id,
            ],
        )
        .map_err(|e| CatalogError::from_write(e, record.slide_id))?;
    require_row(updated, record.id)
}

fn require_row(changed: usize, id: i64) -> Result<()> {
    if changed == 0 {
        return Err(CatalogError::NotFound {
            table: SLIDE_CZI_TO_TIF.name,
            id,
        });
    }
    Ok(())
}

/// SQLite stores NaN as NULL, so a non-finite size could not be read back.
fn check_file_size(file_size: Option<f64>) -> Result<()> {
    match file_size {
        Some(size) if !size.is_finite() => Err(CatalogError::TypeConstraint {
            column: "file_size".into(),
            detail: format!("{} is not a finite number", size),
        }),
        _ => Ok(()),
    }
}

// Column order follows `SLIDE.column_list()`
fn slide_from_row(row: &Row<'_>) -> rusqlite::Result<Slide> {
    Ok(Slide {
        id: row.get(0)?,
        file_name: row.get(1)?,
        active: row.get(2)?,
        created: row.get(3)?,
    })
}

// Column order follows `SLIDE_CZI_TO_TIF.column_list()`
fn czi_tif_from_row(row: &Row<'_>) -> rusqlite::Result<SlideCziTif> {
    Ok(SlideCziTif {
        id: row.get(0)?,
        slide_id: row.get(1)?,
        scene_number: row.get(2)?,
        channel: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        file_name: row.get(6)?,
        file_size: row.get(7)?,
        comments: row.get(8)?,
        active: row.get(9)?,
        created: row.get(10)?,
    })
}

// Implement Debug for better error messages
impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_slide() -> (Catalog, Slide) {
        let catalog = Catalog::open_in_memory().unwrap();
        let slide = catalog.create_slide(&NewSlide::new("DK39_slide001.czi")).unwrap();
        (catalog, slide)
    }

    fn scene3(slide_id: i64) -> NewSlideCziTif {
        NewSlideCziTif {
            slide_id,
            scene_number: Some(3),
            channel: Some(0),
            width: Some(2048),
            height: Some(1536),
            file_name: Some("slide1_scene3_ch0.tif".into()),
            file_size: Some(104_857_600.0),
            comments: None,
        }
    }

    #[test]
    fn test_create_and_fetch() {
        let (catalog, slide) = catalog_with_slide();
        assert_eq!(slide.id, 1);

        let created = catalog.create_czi_tif(&scene3(slide.id)).unwrap();
        let fetched = catalog.czi_tif(created.id).unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.slide_id, 1);
        assert_eq!(fetched.scene_number, Some(3));
        assert_eq!(fetched.channel, Some(0));
        assert_eq!(fetched.width, Some(2048));
        assert_eq!(fetched.height, Some(1536));
        assert_eq!(fetched.file_name.as_deref(), Some("slide1_scene3_ch0.tif"));
        assert_eq!(fetched.file_size, Some(104_857_600.0));
        assert_eq!(fetched.comments, None);
        assert!(fetched.active);
    }

    #[test]
    fn test_omitted_fields_read_back_as_none() {
        let (catalog, slide) = catalog_with_slide();

        let record = catalog
            .create_czi_tif(&NewSlideCziTif::for_slide(slide.id))
            .unwrap();

        assert_eq!(record.scene_number, None);
        assert_eq!(record.channel, None);
        assert_eq!(record.width, None);
        assert_eq!(record.height, None);
        assert_eq!(record.file_name, None);
        assert_eq!(record.file_size, None);
        assert_eq!(record.comments, None);
    }

    #[test]
    fn test_unknown_slide_is_referential_integrity() {
        let catalog = Catalog::open_in_memory().unwrap();

        let err = catalog.create_czi_tif(&scene3(99)).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ReferentialIntegrity { slide_id: 99 }
        ));
        assert_eq!(catalog.czi_tif_count().unwrap(), 0);
    }

    #[test]
    fn test_fetch_unknown_id_is_not_found() {
        let catalog = Catalog::open_in_memory().unwrap();

        let err = catalog.czi_tif(12345).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::NotFound {
                table: "slide_czi_to_tif",
                id: 12345
            }
        ));
    }

    #[test]
    fn test_delete() {
        let (catalog, slide) = catalog_with_slide();
        let record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();

        catalog.delete_czi_tif(record.id).unwrap();

        assert!(matches!(
            catalog.czi_tif(record.id),
            Err(CatalogError::NotFound { .. })
        ));
        assert!(matches!(
            catalog.delete_czi_tif(record.id),
            Err(CatalogError::NotFound { .. })
        ));
        // The parent slide is untouched
        assert!(catalog.slide(slide.id).is_ok());
    }

    #[test]
    fn test_deleting_slide_cascades() {
        let (catalog, slide) = catalog_with_slide();
        let other = catalog.create_slide(&NewSlide::new("DK39_slide002.czi")).unwrap();

        let a = catalog.create_czi_tif(&scene3(slide.id)).unwrap();
        let b = catalog.create_czi_tif(&NewSlideCziTif::for_slide(slide.id)).unwrap();
        let kept = catalog.create_czi_tif(&NewSlideCziTif::for_slide(other.id)).unwrap();

        catalog.delete_slide(slide.id).unwrap();

        assert!(catalog.czi_tif(a.id).is_err());
        assert!(catalog.czi_tif(b.id).is_err());
        assert_eq!(catalog.czi_tif(kept.id).unwrap(), kept);
        assert_eq!(catalog.czi_tif_count().unwrap(), 1);
        assert!(matches!(
            catalog.delete_slide(slide.id),
            Err(CatalogError::NotFound { table: "slide", .. })
        ));
    }

    #[test]
    fn test_update() {
        let (catalog, slide) = catalog_with_slide();
        let mut record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();

        record.width = Some(1024);
        record.file_size = None;
        record.comments = Some("re-exported at half resolution".into());
        catalog.update_czi_tif(&record).unwrap();

        assert_eq!(catalog.czi_tif(record.id).unwrap(), record);
    }

    #[test]
    fn test_update_reparent() {
        let (catalog, slide) = catalog_with_slide();
        let other = catalog.create_slide(&NewSlide::new("DK39_slide002.czi")).unwrap();
        let mut record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();

        record.slide_id = 404;
        let err = catalog.update_czi_tif(&record).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::ReferentialIntegrity { slide_id: 404 }
        ));
        assert_eq!(catalog.czi_tif(record.id).unwrap().slide_id, slide.id);

        record.slide_id = other.id;
        catalog.update_czi_tif(&record).unwrap();
        assert_eq!(catalog.slide_for(&record).unwrap(), other);
        assert!(catalog.czi_tifs_for_slide(slide.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let (catalog, slide) = catalog_with_slide();
        let mut record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();
        record.id = 777;

        assert!(matches!(
            catalog.update_czi_tif(&record),
            Err(CatalogError::NotFound { id: 777, .. })
        ));
    }

    #[test]
    fn test_modify_keeps_id_and_created() {
        let (mut catalog, slide) = catalog_with_slide();
        let record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();

        let modified = catalog
            .modify_czi_tif(record.id, |r| {
                r.id = 0;
                r.created = 0;
                r.channel = Some(2);
            })
            .unwrap();

        assert_eq!(modified.id, record.id);
        assert_eq!(modified.created, record.created);
        assert_eq!(modified.channel, Some(2));
        assert_eq!(catalog.czi_tif(record.id).unwrap(), modified);

        assert!(matches!(
            catalog.modify_czi_tif(555, |_| {}),
            Err(CatalogError::NotFound { id: 555, .. })
        ));
    }

    #[test]
    fn test_comments_and_active() {
        let (catalog, slide) = catalog_with_slide();
        let record = catalog.create_czi_tif(&scene3(slide.id)).unwrap();

        catalog
            .set_czi_tif_comments(record.id, Some("out of focus"))
            .unwrap();
        catalog.set_czi_tif_active(record.id, false).unwrap();

        let fetched = catalog.czi_tif(record.id).unwrap();
        assert_eq!(fetched.comments.as_deref(), Some("out of focus"));
        assert!(!fetched.active);

        catalog.set_czi_tif_comments(record.id, None).unwrap();
        assert_eq!(catalog.czi_tif(record.id).unwrap().comments, None);

        assert!(catalog.set_czi_tif_comments(9, Some("x")).is_err());
    }

    #[test]
    fn test_scenes_for_slide_are_ordered() {
        let (catalog, slide) = catalog_with_slide();
        for (scene, channel) in [(2, 1), (1, 0), (2, 0), (1, 1)] {
            catalog
                .create_czi_tif(&NewSlideCziTif {
                    scene_number: Some(scene),
                    channel: Some(channel),
                    ..NewSlideCziTif::for_slide(slide.id)
                })
                .unwrap();
        }

        let order: Vec<_> = catalog
            .czi_tifs_for_slide(slide.id)
            .unwrap()
            .iter()
            .map(|r| (r.scene_number.unwrap(), r.channel.unwrap()))
            .collect();
        assert_eq!(order, vec![(1, 0), (1, 1), (2, 0), (2, 1)]);

        assert!(catalog.czi_tifs_for_slide(42).unwrap().is_empty());
    }

    #[test]
    fn test_non_finite_file_size_is_rejected() {
        let (catalog, slide) = catalog_with_slide();
        let new = NewSlideCziTif {
            file_size: Some(f64::NAN),
            ..NewSlideCziTif::for_slide(slide.id)
        };

        assert!(matches!(
            catalog.create_czi_tif(&new),
            Err(CatalogError::TypeConstraint { .. })
        ));
    }

    #[test]
    fn test_strict_table_rejects_wrong_type() {
        let (catalog, slide) = catalog_with_slide();

        let err = catalog
            .conn
            .execute(
                "INSERT INTO slide_czi_to_tif (slide_id, width, created) VALUES (?1, 'wide', 0)",
                [slide.id],
            )
            .map_err(|e| CatalogError::from_write(e, slide.id))
            .unwrap_err();

        match err {
            CatalogError::TypeConstraint { column, .. } => {
                assert!(column.ends_with("width"), "{}", column)
            }
            other => panic!("expected TypeConstraint, got {:?}", other),
        }
    }

    #[test]
    fn test_slides_and_counts() {
        let (catalog, slide) = catalog_with_slide();
        let other = catalog.create_slide(&NewSlide::new("DK39_slide002.czi")).unwrap();
        catalog.create_czi_tif(&scene3(other.id)).unwrap();

        assert_eq!(catalog.slides().unwrap(), vec![slide, other]);
        assert_eq!(catalog.slide_count().unwrap(), 2);
        assert_eq!(catalog.czi_tif_count().unwrap(), 1);
        assert!(matches!(
            catalog.slide(3),
            Err(CatalogError::NotFound { table: "slide", id: 3 })
        ));
    }

    #[test]
    fn test_path() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.path(), Path::new(":memory:"));
    }
}
