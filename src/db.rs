use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("tryout.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            nisn TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            classroom TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_classroom ON students(classroom)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            kkm REAL
        )",
        [],
    )?;

    // Existing workspaces may predate the passing-threshold column.
    ensure_subjects_kkm(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tryouts(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tryouts_date ON tryouts(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tryout_subjects(
            tryout_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            PRIMARY KEY(tryout_id, subject_id),
            FOREIGN KEY(tryout_id) REFERENCES tryouts(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tryout_subjects_subject ON tryout_subjects(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            tryout_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            value REAL NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(tryout_id) REFERENCES tryouts(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, tryout_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_tryout ON scores(tryout_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_subject ON scores(subject_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_subjects_kkm(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "subjects", "kkm")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE subjects ADD COLUMN kkm REAL", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
