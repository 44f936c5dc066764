//! History record (scanned report archive) database operations.

use rusqlite::{params, OptionalExtension};

use super::{date_to_string, string_to_date, Database, DbError, DbResult};
use crate::models::{image_digest, HistoryImage, HistoryRecord};

impl Database {
    /// Insert a history record and its images. Repeated images within the
    /// record are stored once.
    pub fn insert_history_record(&mut self, record: &HistoryRecord) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO history_records (id, date, title, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.id,
                date_to_string(&record.date),
                record.title,
                record.notes,
                record.created_at,
            ],
        )?;

        let mut stored = 0;
        for image in &record.images {
            // Digest is recomputed; the bytes are the source of truth.
            let digest = image_digest(&image.data);
            stored += tx.execute(
                r#"
                INSERT OR IGNORE INTO history_images (record_id, digest, position, data)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![record.id, digest, image.position, image.data],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            record_id = %record.id,
            images = stored,
            "Inserted history record"
        );
        Ok(())
    }

    /// Update title, date and notes. Images are managed separately.
    pub fn update_history_record(&self, record: &HistoryRecord) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE history_records SET date = ?2, title = ?3, notes = ?4
            WHERE id = ?1
            "#,
            params![
                record.id,
                date_to_string(&record.date),
                record.title,
                record.notes,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Attach one more image. Returns false when the record already holds
    /// identical bytes.
    pub fn add_history_image(&self, record_id: &str, data: &[u8]) -> DbResult<bool> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM history_records WHERE id = ?", [record_id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(DbError::NotFound(format!("history record {}", record_id)));
        }

        let digest = image_digest(data);
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO history_images (record_id, digest, position, data)
            VALUES (?1, ?2,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM history_images WHERE record_id = ?1),
                ?3)
            "#,
            params![record_id, digest, data],
        )?;
        Ok(rows_affected > 0)
    }

    /// Remove one image by digest.
    ///
    /// A record keeps at least one image; removing the only one is a
    /// constraint error. Returns false when the digest is not attached.
    pub fn remove_history_image(&self, record_id: &str, digest: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            DELETE FROM history_images
            WHERE record_id = ?1 AND digest = ?2
              AND (SELECT COUNT(*) FROM history_images WHERE record_id = ?1) > 1
            "#,
            params![record_id, digest],
        )?;
        if rows_affected > 0 {
            return Ok(true);
        }

        let attached: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM history_images WHERE record_id = ?1 AND digest = ?2)",
            params![record_id, digest],
            |row| row.get(0),
        )?;
        if attached {
            return Err(DbError::Constraint(format!(
                "History record {} must keep at least one image",
                record_id
            )));
        }
        Ok(false)
    }

    /// Get a history record with its images.
    pub fn get_history_record(&self, id: &str) -> DbResult<Option<HistoryRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, date, title, notes, created_at FROM history_records WHERE id = ?",
                [id],
                map_history_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let images = self.load_history_images(&row.id)?;
                let mut record: HistoryRecord = row.try_into()?;
                record.images = images;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All history records, newest first, without image bytes.
    pub fn list_history_records(&self) -> DbResult<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, date, title, notes, created_at
            FROM history_records
            ORDER BY date DESC, created_at DESC
            "#,
        )?;
        let rows = stmt
            .query_map([], map_history_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::new();
        for row in rows {
            let digests = self.list_history_image_digests(&row.id)?;
            let mut record: HistoryRecord = row.try_into()?;
            record.images = digests
                .into_iter()
                .map(|(digest, position)| HistoryImage {
                    digest,
                    data: Vec::new(),
                    position,
                })
                .collect();
            records.push(record);
        }
        Ok(records)
    }

    /// Delete a history record and its images.
    pub fn delete_history_record(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM history_records WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    fn load_history_images(&self, record_id: &str) -> DbResult<Vec<HistoryImage>> {
        let mut stmt = self.conn.prepare(
            "SELECT digest, position, data FROM history_images WHERE record_id = ? ORDER BY position",
        )?;
        let images = stmt
            .query_map([record_id], |row| {
                Ok(HistoryImage {
                    digest: row.get(0)?,
                    position: row.get(1)?,
                    data: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(images)
    }

    fn list_history_image_digests(&self, record_id: &str) -> DbResult<Vec<(String, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT digest, position FROM history_images WHERE record_id = ? ORDER BY position",
        )?;
        let digests = stmt
            .query_map([record_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(digests)
    }
}

fn map_history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        id: row.get(0)?,
        date: row.get(1)?,
        title: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Intermediate row struct for database mapping.
struct HistoryRow {
    id: String,
    date: String,
    title: String,
    notes: String,
    created_at: String,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = DbError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryRecord {
            date: string_to_date(&row.date)?,
            id: row.id,
            title: row.title,
            notes: row.notes,
            images: Vec::new(),
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn scan() -> HistoryRecord {
        let mut record = HistoryRecord::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "Ultrasound report".into(),
        );
        record.notes = "left lobe nodule 4mm".into();
        record.add_image(vec![0xFF, 0xD8, 0x01]);
        record.add_image(vec![0xFF, 0xD8, 0x02]);
        record
    }

    #[test]
    fn test_insert_and_get_history() {
        let mut db = setup_db();
        let record = scan();
        db.insert_history_record(&record).unwrap();

        let retrieved = db.get_history_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.title, "Ultrasound report");
        assert_eq!(retrieved.images.len(), 2);
        assert_eq!(retrieved.images[1].data, vec![0xFF, 0xD8, 0x02]);
        assert_eq!(retrieved.images[0].digest, record.images[0].digest);
    }

    #[test]
    fn test_duplicate_image_stored_once() {
        let mut db = setup_db();
        let mut record = scan();
        // Bypass the model check: two identical entries
        record.images.push(HistoryImage::new(vec![0xFF, 0xD8, 0x01], 2));
        db.insert_history_record(&record).unwrap();

        let retrieved = db.get_history_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.images.len(), 2);

        assert!(!db.add_history_image(&record.id, &[0xFF, 0xD8, 0x02]).unwrap());
        assert!(db.add_history_image(&record.id, &[0x89, 0x50]).unwrap());
        let retrieved = db.get_history_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.images.len(), 3);
        assert_eq!(retrieved.images[2].position, 2);
    }

    #[test]
    fn test_add_image_to_missing_record() {
        let db = setup_db();
        assert!(matches!(
            db.add_history_image("nope", &[1]),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_and_delete() {
        let mut db = setup_db();
        let record = scan();
        db.insert_history_record(&record).unwrap();

        let listed = db.list_history_records().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].images.len(), 2);
        assert!(listed[0].images[0].data.is_empty());

        let digest = record.images[0].digest.clone();
        assert!(db.remove_history_image(&record.id, &digest).unwrap());
        assert!(db.delete_history_record(&record.id).unwrap());
        assert!(db.get_history_record(&record.id).unwrap().is_none());

        let orphans: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM history_images", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_last_image_cannot_be_removed() {
        let mut db = setup_db();
        let record = scan();
        db.insert_history_record(&record).unwrap();
        let first = record.images[0].digest.clone();
        let second = record.images[1].digest.clone();

        assert!(db.remove_history_image(&record.id, &first).unwrap());
        assert!(!db.remove_history_image(&record.id, &first).unwrap());
        assert!(matches!(
            db.remove_history_image(&record.id, &second),
            Err(DbError::Constraint(_))
        ));

        let retrieved = db.get_history_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.images.len(), 1);
        assert_eq!(retrieved.images[0].digest, second);
    }

    #[test]
    fn test_update_history() {
        let mut db = setup_db();
        let mut record = scan();
        db.insert_history_record(&record).unwrap();

        record.title = "Thyroid US".into();
        assert!(db.update_history_record(&record).unwrap());
        let retrieved = db.get_history_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.title, "Thyroid US");
    }
}
