use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

fn parse_date(raw: &str) -> Result<String, String> {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(d) => Ok(d.format("%Y-%m-%d").to_string()),
        Err(_) => Err("date must be formatted YYYY-MM-DD".to_string()),
    }
}

fn parse_subject_ids(req: &Request) -> Result<Vec<String>, serde_json::Value> {
    let Some(raw) = req.params.get("subjectIds").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing subjectIds", None));
    };
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for v in raw {
        let Some(id) = v.as_str() else {
            return Err(err(
                &req.id,
                "bad_params",
                "subjectIds must contain only strings",
                None,
            ));
        };
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(err(
                &req.id,
                "bad_params",
                "subjectIds must not contain empty ids",
                None,
            ));
        }
        let owned = trimmed.to_string();
        if seen.insert(owned.clone()) {
            out.push(owned);
        }
    }
    if out.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            "subjectIds must contain at least one subject id",
            None,
        ));
    }
    Ok(out)
}

fn missing_subject_ids(
    conn: &rusqlite::Connection,
    subject_ids: &[String],
) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT 1 FROM subjects WHERE id = ?")?;
    let mut missing = Vec::new();
    for id in subject_ids {
        let found: Option<i64> = stmt.query_row([id], |r| r.get(0)).optional()?;
        if found.is_none() {
            missing.push(id.clone());
        }
    }
    Ok(missing)
}

fn handle_tryouts_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let mut subjects_stmt = match conn.prepare(
        "SELECT ts.tryout_id, s.id, s.code, s.name
         FROM tryout_subjects ts
         JOIN subjects s ON s.id = ts.subject_id
         ORDER BY s.code",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subject_rows = subjects_stmt
        .query_map([], |row| {
            let tryout_id: String = row.get(0)?;
            let id: String = row.get(1)?;
            let code: String = row.get(2)?;
            let name: String = row.get(3)?;
            Ok((tryout_id, json!({ "id": id, "code": code, "name": name })))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let subject_rows = match subject_rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut subjects_by_tryout: HashMap<String, Vec<serde_json::Value>> = HashMap::new();
    for (tryout_id, subject) in subject_rows {
        subjects_by_tryout.entry(tryout_id).or_default().push(subject);
    }

    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           t.date,
           (SELECT COUNT(*) FROM scores sc WHERE sc.tryout_id = t.id) AS score_count
         FROM tryouts t
         ORDER BY t.date DESC, t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let date: String = row.get(2)?;
            let score_count: i64 = row.get(3)?;
            Ok((id, name, date, score_count))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(tryouts) => {
            let tryouts: Vec<serde_json::Value> = tryouts
                .into_iter()
                .map(|(id, name, date, score_count)| {
                    let subjects = subjects_by_tryout.remove(&id).unwrap_or_default();
                    json!({
                        "id": id,
                        "name": name,
                        "date": date,
                        "subjects": subjects,
                        "scoreCount": score_count
                    })
                })
                .collect();
            ok(&req.id, json!({ "tryouts": tryouts }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_tryouts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let date = match req.params.get("date").and_then(|v| v.as_str()) {
        Some(v) => match parse_date(v.trim()) {
            Ok(d) => d,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        },
        None => return err(&req.id, "bad_params", "missing date", None),
    };
    let subject_ids = match parse_subject_ids(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let missing = match missing_subject_ids(conn, &subject_ids) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !missing.is_empty() {
        return err(
            &req.id,
            "not_found",
            "unknown subject ids",
            Some(json!({ "subjectIds": missing })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    let tryout_id = Uuid::new_v4().to_string();
    if let Err(e) = tx.execute(
        "INSERT INTO tryouts(id, name, date) VALUES(?, ?, ?)",
        (&tryout_id, &name, &date),
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "tryouts" })),
        );
    }
    for subject_id in &subject_ids {
        if let Err(e) = tx.execute(
            "INSERT INTO tryout_subjects(tryout_id, subject_id) VALUES(?, ?)",
            (&tryout_id, subject_id),
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "tryout_subjects" })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "tryoutId": tryout_id,
            "name": name,
            "date": date,
            "subjectIds": subject_ids
        }),
    )
}

fn handle_tryouts_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tryout_id = match req.params.get("tryoutId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing tryoutId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM tryouts WHERE id = ?", [&tryout_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "tryout not found", None);
    }

    if let Some(name) = req.params.get("name").and_then(|v| v.as_str()) {
        let name = name.trim();
        if name.is_empty() {
            return err(&req.id, "bad_params", "name must not be empty", None);
        }
        if let Err(e) = conn.execute(
            "UPDATE tryouts SET name = ? WHERE id = ?",
            (name, &tryout_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    if let Some(date) = req.params.get("date").and_then(|v| v.as_str()) {
        let date = match parse_date(date.trim()) {
            Ok(d) => d,
            Err(msg) => return err(&req.id, "bad_params", msg, None),
        };
        if let Err(e) = conn.execute(
            "UPDATE tryouts SET date = ? WHERE id = ?",
            (&date, &tryout_id),
        ) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    // A provided subjectIds list replaces the covered-subject set outright.
    if req.params.get("subjectIds").is_some() {
        let subject_ids = match parse_subject_ids(req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let missing = match missing_subject_ids(conn, &subject_ids) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if !missing.is_empty() {
            return err(
                &req.id,
                "not_found",
                "unknown subject ids",
                Some(json!({ "subjectIds": missing })),
            );
        }

        let tx = match conn.unchecked_transaction() {
            Ok(t) => t,
            Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
        };
        if let Err(e) = tx.execute(
            "DELETE FROM tryout_subjects WHERE tryout_id = ?",
            [&tryout_id],
        ) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "tryout_subjects" })),
            );
        }
        for subject_id in &subject_ids {
            if let Err(e) = tx.execute(
                "INSERT INTO tryout_subjects(tryout_id, subject_id) VALUES(?, ?)",
                (&tryout_id, subject_id),
            ) {
                let _ = tx.rollback();
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "tryout_subjects" })),
                );
            }
        }
        if let Err(e) = tx.commit() {
            return err(&req.id, "db_commit_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "tryoutId": tryout_id }))
}

fn handle_tryouts_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tryout_id = match req.params.get("tryoutId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing tryoutId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM tryouts WHERE id = ?", [&tryout_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "tryout not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM scores WHERE tryout_id = ?", [&tryout_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "scores" })),
        );
    }
    if let Err(e) = tx.execute(
        "DELETE FROM tryout_subjects WHERE tryout_id = ?",
        [&tryout_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "tryout_subjects" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM tryouts WHERE id = ?", [&tryout_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "tryouts" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

/// The only write path for scores: validates the batch against the tryout's
/// covered subjects and the student roster, then replaces every prior score
/// for the tryout in one transaction. Re-uploading is idempotent; the last
/// upload wins.
fn handle_scores_replace(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let tryout_id = match req.params.get("tryoutId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing tryoutId", None),
    };
    let Some(raw_rows) = req.params.get("rows").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing rows", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM tryouts WHERE id = ?", [&tryout_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "tryout not found", None);
    }

    // Covered subjects, keyed by code the way upload sheets name them.
    let mut covered_stmt = match conn.prepare(
        "SELECT s.code, s.id
         FROM tryout_subjects ts
         JOIN subjects s ON s.id = ts.subject_id
         WHERE ts.tryout_id = ?",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let covered = covered_stmt
        .query_map([&tryout_id], |row| {
            let code: String = row.get(0)?;
            let id: String = row.get(1)?;
            Ok((code, id))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let covered: HashMap<String, String> = match covered {
        Ok(v) => v.into_iter().collect(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    struct UploadRow {
        nisn: String,
        subject_code: String,
        value: f64,
    }

    let mut rows: Vec<UploadRow> = Vec::with_capacity(raw_rows.len());
    let mut uncovered: Vec<String> = Vec::new();
    for (idx, raw) in raw_rows.iter().enumerate() {
        let Some(nisn) = raw.get("nisn").and_then(|v| v.as_str()) else {
            return err(
                &req.id,
                "bad_params",
                "rows must carry a nisn string",
                Some(json!({ "row": idx })),
            );
        };
        let Some(code) = raw.get("subjectCode").and_then(|v| v.as_str()) else {
            return err(
                &req.id,
                "bad_params",
                "rows must carry a subjectCode string",
                Some(json!({ "row": idx })),
            );
        };
        let Some(value) = raw.get("value").and_then(|v| v.as_f64()) else {
            return err(
                &req.id,
                "bad_params",
                "rows must carry a numeric value",
                Some(json!({ "row": idx })),
            );
        };
        let code = code.trim().to_uppercase();
        if !covered.contains_key(&code) {
            if !uncovered.contains(&code) {
                uncovered.push(code.clone());
            }
        }
        rows.push(UploadRow {
            nisn: nisn.trim().to_string(),
            subject_code: code,
            value,
        });
    }
    if !uncovered.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "subject codes not covered by this tryout",
            Some(json!({ "subjectCodes": uncovered })),
        );
    }
    if rows.is_empty() {
        return err(&req.id, "bad_params", "rows must not be empty", None);
    }

    // Every nisn must already be on the roster; uploads never create students.
    let mut student_stmt = match conn.prepare("SELECT id FROM students WHERE nisn = ?") {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut students_by_nisn: HashMap<String, String> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for row in &rows {
        if students_by_nisn.contains_key(&row.nisn) || missing.contains(&row.nisn) {
            continue;
        }
        let found: Option<String> = match student_stmt
            .query_row([&row.nisn], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match found {
            Some(id) => {
                students_by_nisn.insert(row.nisn.clone(), id);
            }
            None => missing.push(row.nisn.clone()),
        }
    }
    if !missing.is_empty() {
        return err(
            &req.id,
            "not_found",
            "unknown nisn(s); register the students first",
            Some(json!({ "missingNisns": missing })),
        );
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM scores WHERE tryout_id = ?", [&tryout_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "scores" })),
        );
    }

    let mut inserted = 0usize;
    for row in &rows {
        let student_id = &students_by_nisn[&row.nisn];
        let subject_id = &covered[&row.subject_code];
        let score_id = Uuid::new_v4().to_string();
        // A duplicate (student, subject) pair within one upload keeps the
        // last row, mirroring how a re-typed spreadsheet cell would land.
        let res = tx.execute(
            "INSERT INTO scores(id, student_id, tryout_id, subject_id, value)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, tryout_id, subject_id) DO UPDATE SET
               value = excluded.value",
            (&score_id, student_id, &tryout_id, subject_id, row.value),
        );
        if let Err(e) = res {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "scores" })),
            );
        }
        inserted += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(tryout = %tryout_id, rows = inserted, "scores replaced");
    ok(
        &req.id,
        json!({
            "tryoutId": tryout_id,
            "replaced": inserted,
            "students": students_by_nisn.len()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tryouts.list" => Some(handle_tryouts_list(state, req)),
        "tryouts.create" => Some(handle_tryouts_create(state, req)),
        "tryouts.update" => Some(handle_tryouts_update(state, req)),
        "tryouts.delete" => Some(handle_tryouts_delete(state, req)),
        "scores.replace" => Some(handle_scores_replace(state, req)),
        _ => None,
    }
}
