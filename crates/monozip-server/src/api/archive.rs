//! POST /api/zip - encrypt uploaded files into a single zip download.
//!
//! Form fields: `files` (repeated), `password`, `password_confirm`, `algo`
//! (`AES-256` or `ZIPCRYPTO`), `zip_name`.

use axum::{
    Router,
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use chrono::{Local, NaiveDateTime};
use monozip_core::archive::{archive_file_name, check_passwords};
use monozip_core::{ArchiveAlgorithm, ArchiveError, EntryCollector};

use super::{ApiError, archive_error_response};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/zip", post(create_zip))
}

/// Everything the form carried, with uploads already size-checked.
#[derive(Debug)]
struct UploadForm {
    collector: EntryCollector,
    password: String,
    password_confirm: String,
    algo: Option<String>,
    zip_name: Option<String>,
}

async fn create_zip(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let form = match read_upload(&mut multipart, state.max_upload_bytes).await {
        Ok(form) => form,
        Err(response) => return response,
    };
    build_zip_response(&state, form, Local::now().naive_local()).await
}

async fn read_upload(multipart: &mut Multipart, limit: u64) -> Result<UploadForm, Response> {
    let mut form = UploadForm {
        collector: EntryCollector::new(limit),
        password: String::new(),
        password_confirm: String::new(),
        algo: None,
        zip_name: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error_response(err, limit))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "files" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| multipart_error_response(err, limit))?;
                form.collector
                    .push(file_name.as_deref(), data.to_vec())
                    .map_err(archive_error_response)?;
            }
            "password" | "password_confirm" | "algo" | "zip_name" => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| multipart_error_response(err, limit))?;
                match field_name.as_str() {
                    "password" => form.password = value,
                    "password_confirm" => form.password_confirm = value,
                    "algo" => form.algo = Some(value),
                    _ => form.zip_name = Some(value),
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn build_zip_response(state: &AppState, form: UploadForm, now: NaiveDateTime) -> Response {
    let password = match check_passwords(&form.password, &form.password_confirm) {
        Ok(password) => password,
        Err(err) => return archive_error_response(err),
    };
    let algorithm = match ArchiveAlgorithm::parse(form.algo.as_deref()) {
        Ok(algorithm) => algorithm,
        Err(err) => return archive_error_response(err),
    };
    let total_bytes = form.collector.total_bytes();
    let entries = match form.collector.finish() {
        Ok(entries) => entries,
        Err(err) => return archive_error_response(err),
    };
    let file_name = archive_file_name(form.zip_name.as_deref(), now);
    let file_count = entries.len();

    let archiver = state.archiver.clone();
    let built =
        tokio::task::spawn_blocking(move || archiver.build(&entries, &password, algorithm)).await;
    let bytes = match built {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(err)) => return archive_error_response(err),
        Err(join_err) => return archive_error_response(ArchiveError::Build(join_err.to_string())),
    };

    tracing::info!(
        files = file_count,
        input_bytes = total_bytes,
        archive_bytes = bytes.len(),
        algorithm = algorithm.as_str(),
        "built encrypted archive"
    );

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        bytes,
    )
        .into_response()
}

fn multipart_error_response(err: MultipartError, limit: u64) -> Response {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return archive_error_response(ArchiveError::TooLarge { limit });
    }
    tracing::warn!(error = %err, "rejected malformed upload");
    ApiError::bad_request(err.body_text()).into_response_with(err.status())
}
