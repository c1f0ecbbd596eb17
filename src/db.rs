//! Local analysis store
//!
//! Keeps each analysis's raw parameter turns and its latest calculation
//! result so the CLI can carry a parameter set across invocations.

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension};

use crate::models::{Analysis, CalculationResult, ParameterSet, RawParameter};
use crate::normalizer::{NormalizeOptions, normalize_with};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- One row per raw parameter, grouped into chat turns
        CREATE TABLE IF NOT EXISTS raw_parameters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id INTEGER NOT NULL,
            turn INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            type TEXT NOT NULL
        );

        -- Latest result per analysis, replaced on rerun
        CREATE TABLE IF NOT EXISTS results (
            analysis_id INTEGER PRIMARY KEY,
            payload TEXT NOT NULL,
            calculated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_raw_parameters_analysis ON raw_parameters(analysis_id, turn);
        "#,
    )?;
    Ok(())
}

/// Create a new analysis and return its id
pub fn create_analysis(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO analyses (name) VALUES (?1)", [name])?;
    let id = conn.last_insert_rowid();
    tracing::info!(id, name, "created analysis");
    Ok(id)
}

const ANALYSIS_COLUMNS: &str = "a.id, a.name, a.created_at,
    (SELECT COUNT(DISTINCT turn) FROM raw_parameters p WHERE p.analysis_id = a.id),
    EXISTS (SELECT 1 FROM results r WHERE r.analysis_id = a.id)";

fn analysis_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Analysis> {
    Ok(Analysis {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        turns: row.get(3)?,
        has_result: row.get(4)?,
    })
}

pub fn get_analysis(conn: &Connection, id: i64) -> Result<Option<Analysis>> {
    let sql = format!("SELECT {} FROM analyses a WHERE a.id = ?1", ANALYSIS_COLUMNS);
    let analysis = conn.query_row(&sql, [id], analysis_from_row).optional()?;
    Ok(analysis)
}

/// List all analyses, oldest first
pub fn list_analyses(conn: &Connection) -> Result<Vec<Analysis>> {
    let sql = format!("SELECT {} FROM analyses a ORDER BY a.id", ANALYSIS_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], analysis_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Delete an analysis with its parameters and result. Returns false if it did not exist.
pub fn delete_analysis(conn: &Connection, id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM raw_parameters WHERE analysis_id = ?1", [id])?;
    tx.execute("DELETE FROM results WHERE analysis_id = ?1", [id])?;
    let removed = tx.execute("DELETE FROM analyses WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(removed > 0)
}

fn require_analysis(conn: &Connection, id: i64) -> Result<()> {
    if get_analysis(conn, id)?.is_none() {
        bail!("analysis {} not found", id);
    }
    Ok(())
}

/// Store one chat turn of raw parameters and return its turn number.
///
/// Callers normalize the turn first; only clean turns belong here.
pub fn append_turn(conn: &Connection, analysis_id: i64, params: &[RawParameter]) -> Result<i64> {
    require_analysis(conn, analysis_id)?;

    let tx = conn.unchecked_transaction()?;
    let turn: i64 = tx.query_row(
        "SELECT COALESCE(MAX(turn), 0) + 1 FROM raw_parameters WHERE analysis_id = ?1",
        [analysis_id],
        |row| row.get(0),
    )?;
    for param in params {
        tx.execute(
            "INSERT INTO raw_parameters (analysis_id, turn, key, value, type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (analysis_id, turn, &param.key, &param.value, &param.kind),
        )?;
    }
    tx.commit()?;

    tracing::info!(analysis_id, turn, count = params.len(), "stored parameter turn");
    Ok(turn)
}

/// All stored turns for an analysis, in the order they were added
pub fn load_turns(conn: &Connection, analysis_id: i64) -> Result<Vec<Vec<RawParameter>>> {
    let mut stmt = conn.prepare(
        "SELECT turn, key, value, type FROM raw_parameters
         WHERE analysis_id = ?1
         ORDER BY turn, id",
    )?;
    let rows = stmt.query_map([analysis_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            RawParameter {
                key: row.get(1)?,
                value: row.get(2)?,
                kind: row.get(3)?,
            },
        ))
    })?;

    let mut turns: Vec<Vec<RawParameter>> = Vec::new();
    let mut current_turn = None;
    for row in rows {
        let (turn, param) = row?;
        if current_turn != Some(turn) {
            turns.push(Vec::new());
            current_turn = Some(turn);
        }
        if let Some(last) = turns.last_mut() {
            last.push(param);
        }
    }
    Ok(turns)
}

/// Rebuild the parameter set by replaying every stored turn over an empty set.
pub fn parameter_set(conn: &Connection, analysis_id: i64, options: &NormalizeOptions) -> Result<ParameterSet> {
    require_analysis(conn, analysis_id)?;

    let mut set = ParameterSet::new();
    for (idx, turn) in load_turns(conn, analysis_id)?.iter().enumerate() {
        set = normalize_with(turn, &set, options)
            .with_context(|| format!("stored turn {} of analysis {} no longer normalizes", idx + 1, analysis_id))?;
    }
    Ok(set)
}

/// Insert or replace the result for an analysis
pub fn upsert_result(conn: &Connection, analysis_id: i64, result: &CalculationResult) -> Result<()> {
    require_analysis(conn, analysis_id)?;
    let payload = serde_json::to_string(result)?;
    conn.execute(
        "INSERT INTO results (analysis_id, payload) VALUES (?1, ?2)
         ON CONFLICT(analysis_id) DO UPDATE SET payload = excluded.payload, calculated_at = CURRENT_TIMESTAMP",
        (analysis_id, &payload),
    )?;
    tracing::info!(analysis_id, "stored calculation result");
    Ok(())
}

/// Latest stored result and when it was calculated
pub fn get_result(conn: &Connection, analysis_id: i64) -> Result<Option<(CalculationResult, String)>> {
    let row = conn
        .query_row(
            "SELECT payload, calculated_at FROM results WHERE analysis_id = ?1",
            [analysis_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    match row {
        Some((payload, calculated_at)) => {
            let result = serde_json::from_str(&payload)
                .with_context(|| format!("stored result for analysis {} is corrupt", analysis_id))?;
            Ok(Some((result, calculated_at)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::calculate;

    fn store() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn round_numbers() -> Vec<RawParameter> {
        vec![
            RawParameter::new("purchasePrice", "100000000", "currency"),
            RawParameter::new("term", "5", "years"),
            RawParameter::new("discountRate", "0.1", "percentage"),
            RawParameter::new("annualRevenue", "30000000", "currency"),
            RawParameter::new("annualOperatingCost", "10000000", "currency"),
        ]
    }

    #[test]
    fn turns_replay_last_write_wins() {
        let conn = store();
        let id = create_analysis(&conn, "Panamax").unwrap();
        assert_eq!(append_turn(&conn, id, &[RawParameter::new("vesselPrice", "10", "currency")]).unwrap(), 1);
        assert_eq!(append_turn(&conn, id, &[RawParameter::new("vesselPrice", "20", "currency")]).unwrap(), 2);

        let turns = load_turns(&conn, id).unwrap();
        assert_eq!(turns.len(), 2);

        let set = parameter_set(&conn, id, &NormalizeOptions::default()).unwrap();
        assert_eq!(set.get("vesselPrice").and_then(|p| p.number()), Some(20.0));
    }

    #[test]
    fn result_is_replaced_on_rerun() {
        let conn = store();
        let id = create_analysis(&conn, "Capesize").unwrap();
        append_turn(&conn, id, &round_numbers()).unwrap();
        let set = parameter_set(&conn, id, &NormalizeOptions::default()).unwrap();
        let first = calculate(&set).unwrap();
        upsert_result(&conn, id, &first).unwrap();

        append_turn(&conn, id, &[RawParameter::new("annualRevenue", "40000000", "currency")]).unwrap();
        let set = parameter_set(&conn, id, &NormalizeOptions::default()).unwrap();
        let second = calculate(&set).unwrap();
        upsert_result(&conn, id, &second).unwrap();

        let (stored, _) = get_result(&conn, id).unwrap().unwrap();
        assert_eq!(stored, second);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn listing_reports_turns_and_results() {
        let conn = store();
        let a = create_analysis(&conn, "A").unwrap();
        create_analysis(&conn, "B").unwrap();
        append_turn(&conn, a, &round_numbers()).unwrap();

        let list = list_analyses(&conn).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].turns, 1);
        assert!(!list[0].has_result);
        assert_eq!(list[1].turns, 0);
    }

    #[test]
    fn delete_removes_everything() {
        let conn = store();
        let id = create_analysis(&conn, "Gone").unwrap();
        append_turn(&conn, id, &round_numbers()).unwrap();
        assert!(delete_analysis(&conn, id).unwrap());
        assert!(get_analysis(&conn, id).unwrap().is_none());
        assert!(load_turns(&conn, id).unwrap().is_empty());
        assert!(!delete_analysis(&conn, id).unwrap());
    }

    #[test]
    fn unknown_analysis_is_an_error() {
        let conn = store();
        assert!(append_turn(&conn, 42, &round_numbers()).is_err());
        assert!(parameter_set(&conn, 42, &NormalizeOptions::default()).is_err());
    }
}
