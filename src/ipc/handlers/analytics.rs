use crate::analytics::AnalyticsError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store;
use crate::summary;
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn analytics_err(req: &Request, e: AnalyticsError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

fn to_response(req: &Request, model: impl serde::Serialize) -> serde_json::Value {
    match serde_json::to_value(model) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "serialize_failed", e.to_string(), None),
    }
}

fn handle_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match store::fetch_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return analytics_err(req, e),
    };
    to_response(req, summary::dashboard_summary(&snapshot))
}

fn handle_classes(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match store::fetch_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return analytics_err(req, e),
    };
    let classes = summary::classroom_comparison(&snapshot);
    to_response(req, json!({ "classes": classes }))
}

fn handle_student_trends(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let nisn = match required_str(req, "nisn") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match store::fetch_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return analytics_err(req, e),
    };
    match summary::student_subject_trends(&snapshot, &nisn) {
        Ok(model) => to_response(req, model),
        Err(e) => analytics_err(req, e),
    }
}

fn handle_student_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let nisn = match required_str(req, "nisn") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let snapshot = match store::fetch_snapshot(conn) {
        Ok(v) => v,
        Err(e) => return analytics_err(req, e),
    };
    match summary::student_report(&snapshot, &nisn) {
        Ok(model) => to_response(req, model),
        Err(e) => analytics_err(req, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.dashboard" => Some(handle_dashboard(state, req)),
        "analytics.classes" => Some(handle_classes(state, req)),
        "analytics.student" => Some(handle_student_trends(state, req)),
        "student.results" => Some(handle_student_results(state, req)),
        _ => None,
    }
}
