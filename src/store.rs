//! Read interface over the workspace database. Analytics builders never touch
//! the connection themselves; they consume the row snapshot fetched here.

use rusqlite::Connection;

use crate::analytics::{AnalyticsError, ScoreLike};

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub nisn: String,
    pub name: String,
    pub classroom: String,
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub kkm: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TryoutRow {
    pub id: String,
    pub name: String,
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub student_id: String,
    pub tryout_id: String,
    pub subject_id: String,
    pub value: f64,
}

impl ScoreLike for ScoreRow {
    fn value(&self) -> f64 {
        self.value
    }
}

/// Everything the analytics builders need, fetched once per request.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub students: Vec<StudentRow>,
    pub subjects: Vec<SubjectRow>,
    pub tryouts: Vec<TryoutRow>,
    pub scores: Vec<ScoreRow>,
}

fn db_err(e: rusqlite::Error) -> AnalyticsError {
    AnalyticsError::new("db_query_failed", e.to_string())
}

pub fn fetch_snapshot(conn: &Connection) -> Result<Snapshot, AnalyticsError> {
    Ok(Snapshot {
        students: fetch_students(conn)?,
        subjects: fetch_subjects(conn)?,
        tryouts: fetch_tryouts(conn)?,
        scores: fetch_scores(conn)?,
    })
}

/// Students ordered by classroom then name. Ranking ties fall back to this
/// order, so it must stay deterministic.
pub fn fetch_students(conn: &Connection) -> Result<Vec<StudentRow>, AnalyticsError> {
    let mut stmt = conn
        .prepare("SELECT id, nisn, name, classroom FROM students ORDER BY classroom, name")
        .map_err(db_err)?;
    stmt.query_map([], |r| {
        Ok(StudentRow {
            id: r.get(0)?,
            nisn: r.get(1)?,
            name: r.get(2)?,
            classroom: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

pub fn fetch_subjects(conn: &Connection) -> Result<Vec<SubjectRow>, AnalyticsError> {
    let mut stmt = conn
        .prepare("SELECT id, code, name, kkm FROM subjects ORDER BY code")
        .map_err(db_err)?;
    stmt.query_map([], |r| {
        Ok(SubjectRow {
            id: r.get(0)?,
            code: r.get(1)?,
            name: r.get(2)?,
            kkm: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Tryouts in chronological order; dates are ISO strings so lexicographic
/// order is date order.
pub fn fetch_tryouts(conn: &Connection) -> Result<Vec<TryoutRow>, AnalyticsError> {
    let mut stmt = conn
        .prepare("SELECT id, name, date FROM tryouts ORDER BY date, name")
        .map_err(db_err)?;
    stmt.query_map([], |r| {
        Ok(TryoutRow {
            id: r.get(0)?,
            name: r.get(1)?,
            date: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

pub fn fetch_scores(conn: &Connection) -> Result<Vec<ScoreRow>, AnalyticsError> {
    let mut stmt = conn
        .prepare("SELECT student_id, tryout_id, subject_id, value FROM scores")
        .map_err(db_err)?;
    stmt.query_map([], |r| {
        Ok(ScoreRow {
            student_id: r.get(0)?,
            tryout_id: r.get(1)?,
            subject_id: r.get(2)?,
            value: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}
