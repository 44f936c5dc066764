//! Checkup record and indicator database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Transaction};

use super::{date_to_string, string_to_date, Database, DbError, DbResult};
use crate::models::{CheckupRecord, CheckupType, Indicator, IndicatorStatus};

const RECORD_COLUMNS: &str = "id, date, checkup_type, notes, created_at, updated_at";

impl Database {
    /// Insert a record with its indicators.
    ///
    /// Indicator status is derived again here from value and range; whatever
    /// the caller put in `status` is ignored.
    pub fn insert_record(&mut self, record: &CheckupRecord) -> DbResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO checkup_records (
                id, date, checkup_type, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.id,
                date_to_string(&record.date),
                record.checkup_type.as_str(),
                record.notes,
                record.created_at,
                record.updated_at,
            ],
        )?;
        insert_indicators(&tx, &record.id, &record.indicators)?;
        tx.commit()?;

        tracing::info!(
            record_id = %record.id,
            checkup_type = record.checkup_type.as_str(),
            indicators = record.indicators.len(),
            "Inserted checkup record"
        );
        Ok(())
    }

    /// Replace a record's fields and indicators.
    pub fn update_record(&mut self, record: &CheckupRecord) -> DbResult<bool> {
        let tx = self.conn.transaction()?;
        let rows_affected = tx.execute(
            r#"
            UPDATE checkup_records SET
                date = ?2,
                checkup_type = ?3,
                notes = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                record.id,
                date_to_string(&record.date),
                record.checkup_type.as_str(),
                record.notes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        if rows_affected == 0 {
            return Ok(false);
        }

        tx.execute("DELETE FROM indicators WHERE record_id = ?", [&record.id])?;
        insert_indicators(&tx, &record.id, &record.indicators)?;
        tx.commit()?;

        tracing::info!(record_id = %record.id, "Updated checkup record");
        Ok(true)
    }

    /// Get a record by ID, with its indicators.
    pub fn get_record(&self, id: &str) -> DbResult<Option<CheckupRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM checkup_records WHERE id = ?", RECORD_COLUMNS),
                [id],
                map_record_row,
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row)?)),
            None => Ok(None),
        }
    }

    /// Delete a record; its indicators go with it.
    pub fn delete_record(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM checkup_records WHERE id = ?", [id])?;
        if rows_affected > 0 {
            tracing::info!(record_id = %id, "Deleted checkup record");
        }
        Ok(rows_affected > 0)
    }

    /// All records, newest first.
    pub fn list_records(&self) -> DbResult<Vec<CheckupRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM checkup_records ORDER BY date DESC, created_at DESC",
            RECORD_COLUMNS
        ))?;
        let rows = stmt
            .query_map([], map_record_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// Records of one type, newest first.
    pub fn list_records_by_type(&self, checkup_type: CheckupType) -> DbResult<Vec<CheckupRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM checkup_records WHERE checkup_type = ? ORDER BY date DESC, created_at DESC",
            RECORD_COLUMNS
        ))?;
        let rows = stmt
            .query_map([checkup_type.as_str()], map_record_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(|row| self.hydrate(row)).collect()
    }

    /// IDs of records of `checkup_type` on the calendar day `date`.
    pub fn find_records_on_day(
        &self,
        date: NaiveDate,
        checkup_type: CheckupType,
    ) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id FROM checkup_records
            WHERE date = ?1 AND checkup_type = ?2
            ORDER BY created_at
            "#,
        )?;
        let ids = stmt
            .query_map(
                params![date_to_string(&date), checkup_type.as_str()],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Date of the most recent record of `checkup_type`.
    pub fn latest_record_date(&self, checkup_type: CheckupType) -> DbResult<Option<NaiveDate>> {
        let latest: Option<String> = self.conn.query_row(
            "SELECT MAX(date) FROM checkup_records WHERE checkup_type = ?",
            [checkup_type.as_str()],
            |row| row.get(0),
        )?;
        latest.as_deref().map(string_to_date).transpose()
    }

    /// Number of stored records.
    pub fn count_records(&self) -> DbResult<u32> {
        let count: u32 =
            self.conn
                .query_row("SELECT COUNT(*) FROM checkup_records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of stored indicators across all records.
    pub fn count_indicators(&self) -> DbResult<u32> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM indicators", [], |row| row.get(0))?;
        Ok(count)
    }

    fn load_indicators(&self, record_id: &str) -> DbResult<Vec<Indicator>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, record_id, name, value, unit, normal_range, status
            FROM indicators
            WHERE record_id = ?
            ORDER BY position
            "#,
        )?;

        let rows = stmt.query_map([record_id], |row| {
            Ok(IndicatorRow {
                id: row.get(0)?,
                record_id: row.get(1)?,
                name: row.get(2)?,
                value: row.get(3)?,
                unit: row.get(4)?,
                normal_range: row.get(5)?,
                status: row.get(6)?,
            })
        })?;

        let mut indicators = Vec::new();
        for row in rows {
            indicators.push(row?.try_into()?);
        }
        Ok(indicators)
    }

    fn hydrate(&self, row: RecordRow) -> DbResult<CheckupRecord> {
        let indicators = self.load_indicators(&row.id)?;
        let mut record: CheckupRecord = row.try_into()?;
        record.indicators = indicators;
        Ok(record)
    }
}

fn insert_indicators(tx: &Transaction<'_>, record_id: &str, indicators: &[Indicator]) -> DbResult<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO indicators (
            id, record_id, position, name, value, unit, normal_range, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?;

    for (position, indicator) in indicators.iter().enumerate() {
        if !indicator.value.is_finite() {
            return Err(DbError::Constraint(format!(
                "Indicator {} has a non-finite value",
                indicator.name
            )));
        }
        let status = IndicatorStatus::derive(indicator.value, &indicator.normal_range);
        stmt.execute(params![
            indicator.id,
            record_id,
            position as i64,
            indicator.name,
            indicator.value,
            indicator.unit,
            indicator.normal_range,
            status.as_str(),
        ])?;
    }
    Ok(())
}

fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        date: row.get(1)?,
        checkup_type: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    id: String,
    date: String,
    checkup_type: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RecordRow> for CheckupRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(CheckupRecord {
            date: string_to_date(&row.date)?,
            checkup_type: string_to_checkup_type(&row.checkup_type)?,
            id: row.id,
            notes: row.notes,
            indicators: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct IndicatorRow {
    id: String,
    record_id: String,
    name: String,
    value: f64,
    unit: String,
    normal_range: String,
    status: String,
}

impl TryFrom<IndicatorRow> for Indicator {
    type Error = DbError;

    fn try_from(row: IndicatorRow) -> Result<Self, Self::Error> {
        let status = IndicatorStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown indicator status: {}", row.status)))?;

        Ok(Indicator {
            id: row.id,
            record_id: row.record_id,
            name: row.name,
            value: row.value,
            unit: row.unit,
            normal_range: row.normal_range,
            status,
        })
    }
}

pub(crate) fn string_to_checkup_type(s: &str) -> Result<CheckupType, DbError> {
    CheckupType::parse(s).ok_or_else(|| DbError::Constraint(format!("Unknown checkup type: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn panel(on: NaiveDate) -> CheckupRecord {
        let mut record = CheckupRecord::new(on, CheckupType::Comprehensive);
        record.add_indicator("TSH", 5.1, "mIU/L", "0.27-4.2");
        record.add_indicator("FT4", 15.0, "pmol/L", "12-22");
        record
    }

    #[test]
    fn test_insert_and_get_record() {
        let mut db = setup_db();
        let mut record = panel(date(2024, 5, 20));
        record.notes = Some("fasting".into());
        db.insert_record(&record).unwrap();

        let retrieved = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved, record);
        assert_eq!(retrieved.indicators[0].status, IndicatorStatus::High);
    }

    #[test]
    fn test_status_derived_on_write() {
        let mut db = setup_db();
        let mut record = panel(date(2024, 5, 20));
        // A stale status from the caller is not trusted
        record.indicators[0].status = IndicatorStatus::Low;
        db.insert_record(&record).unwrap();

        let retrieved = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.indicators[0].status, IndicatorStatus::High);
    }

    #[test]
    fn test_update_replaces_indicators() {
        let mut db = setup_db();
        let mut record = panel(date(2024, 5, 20));
        db.insert_record(&record).unwrap();

        record.indicators.remove(1);
        record.indicators[0].value = 2.0;
        record.notes = Some("retest".into());
        assert!(db.update_record(&record).unwrap());

        let retrieved = db.get_record(&record.id).unwrap().unwrap();
        assert_eq!(retrieved.indicators.len(), 1);
        assert_eq!(retrieved.indicators[0].status, IndicatorStatus::Normal);
        assert_eq!(retrieved.notes.as_deref(), Some("retest"));
        assert_eq!(db.count_indicators().unwrap(), 1);
    }

    #[test]
    fn test_update_stamps_rfc3339() {
        let mut db = setup_db();
        let mut record = panel(date(2024, 5, 20));
        record.updated_at = "2024-05-20T08:00:00+00:00".into();
        db.insert_record(&record).unwrap();

        assert!(db.update_record(&record).unwrap());
        let retrieved = db.get_record(&record.id).unwrap().unwrap();
        let stamped = chrono::DateTime::parse_from_rfc3339(&retrieved.updated_at).unwrap();
        let inserted = chrono::DateTime::parse_from_rfc3339(&record.updated_at).unwrap();
        assert!(stamped > inserted);
        assert!(chrono::DateTime::parse_from_rfc3339(&retrieved.created_at).is_ok());
    }

    #[test]
    fn test_update_missing_record() {
        let mut db = setup_db();
        let record = panel(date(2024, 5, 20));
        assert!(!db.update_record(&record).unwrap());
        assert_eq!(db.count_indicators().unwrap(), 0);
    }

    #[test]
    fn test_delete_cascades_to_indicators() {
        let mut db = setup_db();
        let record = panel(date(2024, 5, 20));
        db.insert_record(&record).unwrap();
        assert_eq!(db.count_indicators().unwrap(), 2);

        assert!(db.delete_record(&record.id).unwrap());
        assert_eq!(db.count_indicators().unwrap(), 0);
        assert!(db.get_record(&record.id).unwrap().is_none());
        assert!(!db.delete_record(&record.id).unwrap());
    }

    #[test]
    fn test_list_newest_first() {
        let mut db = setup_db();
        let older = panel(date(2023, 11, 2));
        let newer = panel(date(2024, 5, 20));
        let scan = CheckupRecord::new(date(2024, 1, 10), CheckupType::Ultrasound);
        db.insert_record(&older).unwrap();
        db.insert_record(&newer).unwrap();
        db.insert_record(&scan).unwrap();

        let all = db.list_records().unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), scan.id.as_str(), older.id.as_str()]);

        let panels = db.list_records_by_type(CheckupType::Comprehensive).unwrap();
        assert_eq!(panels.len(), 2);
        assert_eq!(db.count_records().unwrap(), 3);
    }

    #[test]
    fn test_find_records_on_day() {
        let mut db = setup_db();
        let record = panel(date(2024, 5, 20));
        db.insert_record(&record).unwrap();

        assert_eq!(
            db.find_records_on_day(date(2024, 5, 20), CheckupType::Comprehensive)
                .unwrap(),
            vec![record.id.clone()]
        );
        assert!(db
            .find_records_on_day(date(2024, 5, 20), CheckupType::Ultrasound)
            .unwrap()
            .is_empty());
        assert!(db
            .find_records_on_day(date(2024, 5, 21), CheckupType::Comprehensive)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_latest_record_date() {
        let mut db = setup_db();
        assert_eq!(db.latest_record_date(CheckupType::Comprehensive).unwrap(), None);

        db.insert_record(&panel(date(2023, 11, 2))).unwrap();
        db.insert_record(&panel(date(2024, 5, 20))).unwrap();
        assert_eq!(
            db.latest_record_date(CheckupType::Comprehensive).unwrap(),
            Some(date(2024, 5, 20))
        );
        assert_eq!(db.latest_record_date(CheckupType::Thyroglobulin).unwrap(), None);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let mut db = setup_db();
        let mut record = panel(date(2024, 5, 20));
        record.indicators[0].value = f64::NAN;
        assert!(matches!(db.insert_record(&record), Err(DbError::Constraint(_))));
        // Transaction rolled back
        assert_eq!(db.count_records().unwrap(), 0);
    }
}
