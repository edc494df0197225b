//! HTTP routes
//!
//! Every route is boxed to `(Response,)` and unified, so the whole table is
//! one filter. Paths are matched before methods so unknown paths stay 404.
//! JSON endpoints answer errors as `{"ok": false, "msg": ...}`
//! with the status from [`LimsError::status_code`]; HTML endpoints answer
//! with a small error page.

use crate::logging::{read_log_tail, LOG_TAIL_LINES};
use crate::multipart::{Form, MAX_FORM_BYTES};
use crate::pages;
use lims_core::{Attachment, CaseService, LimsError, TrackOutcome, QR_URL_PREFIX, SESSION_COOKIE};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use warp::filters::BoxedFilter;
use warp::http::{header, StatusCode, Uri};
use warp::multipart::FormData;
use warp::path::Tail;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    /// Case workflow
    pub service: Arc<CaseService>,
    /// Log file backing `/logs`
    pub log_file: PathBuf,
    /// Directory served under `/static/qrs`
    pub qr_dir: PathBuf,
}

impl AppState {
    /// Create state
    #[must_use]
    pub fn new(service: Arc<CaseService>, log_file: impl Into<PathBuf>, qr_dir: impl Into<PathBuf>) -> Self {
        Self {
            service,
            log_file: log_file.into(),
            qr_dir: qr_dir.into(),
        }
    }
}

/// Query of a case scan
#[derive(Debug, Default, Deserialize)]
pub struct TrackQuery {
    /// Phase to record
    pub phase: Option<String>,
    /// Free-text note
    pub note: Option<String>,
}

/// The full route table
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let qr_dir = state.qr_dir.clone();

    dashboard()
        .or(list_cases(state.clone()))
        .unify()
        .or(new_case(state.clone()))
        .unify()
        .or(upload_file(state.clone()))
        .unify()
        .or(set_employee(state.clone()))
        .unify()
        .or(scan_ready(state.clone()))
        .unify()
        .or(employee_qrs(state.clone()))
        .unify()
        .or(case_track(state.clone()))
        .unify()
        .or(print_order(state.clone()))
        .unify()
        .or(delete_case(state.clone()))
        .unify()
        .or(logs(state))
        .unify()
        .or(static_qrs(qr_dir))
        .unify()
        .recover(handle_rejection)
        .unify()
        .with(warp::trace::request())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn session_cookie() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
}

fn dashboard() -> BoxedFilter<(Response,)> {
    warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(pages::dashboard()).into_response())
        .boxed()
}

fn list_cases(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("cases")
        .and(warp::get())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let reply = match state.service.list().await {
                Ok(cases) => warp::reply::json(&json!({ "cases": cases })).into_response(),
                Err(e) => json_error(&e),
            };
            Ok::<_, Rejection>(reply)
        })
        .boxed()
}

fn new_case(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("new_case")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_FORM_BYTES))
        .and(with_state(state))
        .and_then(handle_new_case)
        .boxed()
}

async fn handle_new_case(form: FormData, state: AppState) -> Result<Response, Rejection> {
    let form = match Form::collect(form).await {
        Ok(form) => form,
        Err(e) => return Ok(bad_request(&format!("invalid form: {e}"))),
    };
    let Some(name) = form.trimmed("paciente") else {
        return Ok(bad_request("paciente is required"));
    };
    let notes = form.text("notas").unwrap_or_default();
    let attachments = form
        .files("archivos")
        .map(|f| Attachment::new(f.file_name.clone().unwrap_or_default(), f.data.clone()))
        .collect();

    match state.service.create_case(&name, &notes, attachments).await {
        Ok(case) => Ok(warp::reply::json(&json!({
            "ok": true,
            "path": case.dir.display().to_string(),
        }))
        .into_response()),
        Err(e) => Ok(json_error(&e)),
    }
}

fn upload_file(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("upload_file")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_FORM_BYTES))
        .and(with_state(state))
        .and_then(handle_upload_file)
        .boxed()
}

async fn handle_upload_file(form: FormData, state: AppState) -> Result<Response, Rejection> {
    let form = match Form::collect(form).await {
        Ok(form) => form,
        Err(e) => return Ok(bad_request(&format!("invalid form: {e}"))),
    };
    let Some(case_name) = form.trimmed("case_name") else {
        return Ok(bad_request("case_name is required"));
    };
    let Some(file) = form.files("file").next() else {
        return Ok(bad_request("file is required"));
    };
    let file_name = file.file_name.clone().unwrap_or_default();

    match state.service.upload(&case_name, &file_name, &file.data).await {
        Ok(path) => Ok(warp::reply::json(&json!({
            "ok": true,
            "path": path.display().to_string(),
        }))
        .into_response()),
        Err(e) => Ok(json_error(&e)),
    }
}

fn set_employee(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("set_emp" / String / String)
        .and(warp::get())
        .and(with_state(state))
        .map(|employee_id: String, pin: String, state: AppState| {
            let employee_id = decode(&employee_id);
            match state.service.identifier().identify(&employee_id, &decode(&pin)) {
                Ok(session) => {
                    tracing::info!(employee = %session.employee_id, "device identified");
                    let cookie = format!(
                        "{SESSION_COOKIE}={}; Max-Age={}; Path=/; SameSite=Lax",
                        session.token(),
                        session.max_age_secs(chrono::Utc::now()),
                    );
                    let redirect = warp::redirect::see_other(Uri::from_static("/scan_ready"));
                    warp::reply::with_header(redirect, header::SET_COOKIE, cookie).into_response()
                }
                Err(e) => {
                    tracing::warn!(employee = %employee_id, error = %e, "identification refused");
                    json_error(&e)
                }
            }
        })
        .boxed()
}

fn scan_ready(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("scan_ready")
        .and(warp::get())
        .and(session_cookie())
        .and(with_state(state))
        .map(|token: Option<String>, state: AppState| {
            match state.service.current_employee(token.as_deref()) {
                Some(employee) => warp::reply::html(pages::scan_ready(employee)).into_response(),
                None => warp::redirect::see_other(Uri::from_static("/local_auto_qr")).into_response(),
            }
        })
        .boxed()
}

fn employee_qrs(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("local_auto_qr")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            let html = pages::employee_qrs(state.service.directory().iter(), QR_URL_PREFIX);
            warp::reply::html(html).into_response()
        })
        .boxed()
}

fn case_track(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path("case_track")
        .and(warp::path::tail())
        .and(warp::get())
        .and(warp::query::<TrackQuery>())
        .and(session_cookie())
        .and(with_state(state))
        .and_then(handle_case_track)
        .boxed()
}

async fn handle_case_track(
    tail: Tail,
    query: TrackQuery,
    token: Option<String>,
    state: AppState,
) -> Result<Response, Rejection> {
    let name = decode(tail.as_str());
    let outcome = state
        .service
        .track(
            &name,
            token.as_deref(),
            query.phase.as_deref(),
            query.note.as_deref(),
        )
        .await;

    Ok(match outcome {
        Ok(TrackOutcome::Recorded { case, event, .. }) => {
            warp::reply::html(pages::recorded(&case, &event)).into_response()
        }
        Ok(TrackOutcome::IdentifyFirst { case }) => {
            warp::reply::html(pages::identify_first(&case)).into_response()
        }
        Err(e) => html_error(&e),
    })
}

fn print_order(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path("print_order")
        .and(warp::path::tail())
        .and(warp::get())
        .and(with_state(state))
        .and_then(|tail: Tail, state: AppState| async move {
            let store = state.service.store();
            let reply = match store.open(&decode(tail.as_str())).await {
                Ok(case) => {
                    let case_state = store.load(&case).await;
                    let instructions = store.instructions(&case).await;
                    let qr_url = store.qr_url(&case, QR_URL_PREFIX).await;
                    warp::reply::html(pages::print_order(&case, &case_state, &instructions, &qr_url))
                        .into_response()
                }
                Err(e) => html_error(&e),
            };
            Ok::<_, Rejection>(reply)
        })
        .boxed()
}

fn delete_case(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path("case")
        .and(warp::path::tail())
        .and(warp::delete())
        .and(with_state(state))
        .and_then(|tail: Tail, state: AppState| async move {
            let reply = match state.service.delete_case(&decode(tail.as_str())).await {
                Ok(report) if report.is_complete() => {
                    warp::reply::json(&json!({ "ok": true })).into_response()
                }
                Ok(report) => {
                    let failed: Vec<String> = report
                        .failed
                        .iter()
                        .map(|(path, error)| format!("{}: {error}", path.display()))
                        .collect();
                    warp::reply::with_status(
                        warp::reply::json(&json!({
                            "ok": false,
                            "msg": "case partially deleted",
                            "failed": failed,
                        })),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    )
                    .into_response()
                }
                Err(e) => json_error(&e),
            };
            Ok::<_, Rejection>(reply)
        })
        .boxed()
}

fn logs(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("logs")
        .and(warp::get())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let reply = match read_log_tail(&state.log_file, LOG_TAIL_LINES).await {
                Ok(lines) => warp::reply::json(&json!({ "lines": lines })).into_response(),
                Err(e) => json_error(&e),
            };
            Ok::<_, Rejection>(reply)
        })
        .boxed()
}

fn static_qrs(qr_dir: PathBuf) -> BoxedFilter<(Response,)> {
    warp::path("static")
        .and(warp::path("qrs"))
        .and(warp::get())
        .and(warp::fs::dir(qr_dir))
        .map(|file: warp::fs::File| file.into_response())
        .boxed()
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn status_of(err: &LimsError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_error(err: &LimsError) -> Response {
    if !err.is_client_error() {
        tracing::error!(error = %err, "request failed");
    }
    warp::reply::with_status(
        warp::reply::json(&json!({ "ok": false, "msg": err.to_string() })),
        status_of(err),
    )
    .into_response()
}

fn html_error(err: &LimsError) -> Response {
    if !err.is_client_error() {
        tracing::error!(error = %err, "request failed");
    }
    warp::reply::with_status(warp::reply::html(pages::error(&err.to_string())), status_of(err))
        .into_response()
}

fn bad_request(msg: &str) -> Response {
    warp::reply::with_status(
        warp::reply::json(&json!({ "ok": false, "msg": msg })),
        StatusCode::BAD_REQUEST,
    )
    .into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, msg) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "form too large".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        tracing::warn!(?rejection, "unhandled rejection");
        (StatusCode::BAD_REQUEST, "bad request".to_string())
    };
    Ok(warp::reply::with_status(warp::reply::json(&json!({ "ok": false, "msg": msg })), status)
        .into_response())
}
