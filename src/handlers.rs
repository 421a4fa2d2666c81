use actix_multipart::{Field, Multipart};
use actix_web::dev::Payload;
use actix_web::error::BlockingError;
use actix_web::http::header;
use actix_web::{delete, get, post, web, FromRequest, HttpRequest, HttpResponse};
use futures::future::{ready, Ready};
use futures::StreamExt;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use std::fmt;

use crate::auth::{AuthService, Principal};
use crate::error::{ApiError, StorageError};
use crate::storage::StorageEngine;

/// Multipart field carrying the uploaded file.
const UPLOAD_FIELD: &str = "file";

/// Services shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub storage: StorageEngine,
}

#[derive(Deserialize)]
struct CredentialsPayload {
    username: String,
    password: String,
}

type ApiResult = Result<HttpResponse, ApiError>;

const UPLOAD_FAILED: &str = "Error uploading file";
const DOWNLOAD_FAILED: &str = "Error downloading file";

fn from_blocking<E>(e: BlockingError<E>) -> ApiError
where
    E: Into<ApiError> + fmt::Debug,
{
    map_blocking(e, Into::into)
}

fn map_blocking<E, F>(e: BlockingError<E>, map: F) -> ApiError
where
    E: fmt::Debug,
    F: FnOnce(E) -> ApiError,
{
    match e {
        BlockingError::Error(e) => map(e),
        BlockingError::Canceled => {
            ApiError::internal("Internal server error", "blocking task canceled")
        }
    }
}

fn principal_from_request(req: &HttpRequest) -> Result<Principal, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::internal("Internal server error", "application state missing"))?;

    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::Unauthorized("Invalid token"))?,
        None => return Err(ApiError::Unauthorized("Missing authorization token")),
    };
    if token.is_empty() {
        return Err(ApiError::Unauthorized("Missing authorization token"));
    }

    Ok(state.auth.validate_token(token)?)
}

impl FromRequest for Principal {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;
    type Config = ();

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(principal_from_request(req))
    }
}

#[post("/register")]
async fn register(state: web::Data<AppState>, payload: web::Json<CredentialsPayload>) -> ApiResult {
    let payload = payload.into_inner();
    let auth = state.auth.clone();
    web::block(move || auth.register(&payload.username, &payload.password))
        .await
        .map_err(from_blocking)?;

    Ok(HttpResponse::Created().finish())
}

#[post("/login")]
async fn login(state: web::Data<AppState>, payload: web::Json<CredentialsPayload>) -> ApiResult {
    let payload = payload.into_inner();
    let auth = state.auth.clone();
    let token = web::block(move || {
        let user = auth.authenticate(&payload.username, &payload.password)?;
        auth.issue_token(&user)
    })
    .await
    .map_err(from_blocking)?;

    Ok(HttpResponse::Ok().json(json!({ "token": token })))
}

/// Reads the field into memory, stopping as soon as it exceeds `max_len`.
async fn read_field(field: &mut Field, max_len: u64) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        data.extend_from_slice(&chunk);
        if data.len() as u64 > max_len {
            let exceeded = StorageError::QuotaExceeded {
                requested: data.len() as u64,
                limit: max_len,
            };
            return Err(ApiError::from_transfer(UPLOAD_FAILED, exceeded));
        }
    }
    Ok(data)
}

#[post("/upload")]
async fn upload(
    state: web::Data<AppState>,
    principal: Principal,
    mut payload: Multipart,
) -> ApiResult {
    let max_len = state.storage.limits().max_upload_bytes;
    let mut received = None;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| ApiError::BadRequest(e.to_string()))?;
        let disposition = field.content_disposition();
        let is_file = disposition
            .as_ref()
            .and_then(|cd| cd.get_name())
            .map_or(false, |name| name == UPLOAD_FIELD);

        if !is_file || received.is_some() {
            // Drain fields we don't use.
            while let Some(chunk) = field.next().await {
                chunk.map_err(|e| ApiError::BadRequest(e.to_string()))?;
            }
            continue;
        }

        let filename = disposition
            .as_ref()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Uploaded file has no filename".into()))?;
        let data = read_field(&mut field, max_len).await?;
        received = Some((filename, data));
    }

    let (filename, data) =
        received.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    debug!(
        "User {} uploading {} ({} bytes)",
        principal.user_id,
        filename,
        data.len()
    );

    let storage = state.storage.clone();
    web::block(move || storage.upload(principal.user_id, &filename, &data))
        .await
        .map_err(|e| map_blocking(e, |e| ApiError::from_transfer(UPLOAD_FAILED, e)))?;

    Ok(HttpResponse::Ok().body("File uploaded successfully"))
}

#[get("/download/{filename}")]
async fn download(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> ApiResult {
    let filename = path.into_inner();
    let storage = state.storage.clone();
    let name = filename.clone();
    let data = web::block(move || storage.download(principal.user_id, &name))
        .await
        .map_err(|e| map_blocking(e, |e| ApiError::from_transfer(DOWNLOAD_FAILED, e)))?;

    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", filename),
        )
        .header(header::CONTENT_LENGTH, data.len().to_string())
        .body(data))
}

#[get("/files")]
async fn list_files(state: web::Data<AppState>, principal: Principal) -> ApiResult {
    let storage = state.storage.clone();
    let (usage, files) = web::block(move || {
        let usage = storage.usage(principal.user_id)?;
        let files = storage.list(principal.user_id)?;
        Ok::<_, StorageError>((usage, files))
    })
    .await
    .map_err(from_blocking)?;

    Ok(HttpResponse::Ok().json(json!({ "usage": usage, "files": files })))
}

#[delete("/files/{filename}")]
async fn delete_file(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<String>,
) -> ApiResult {
    let filename = path.into_inner();
    let storage = state.storage.clone();
    let user_id = principal.user_id;
    web::block(move || storage.delete(user_id, &filename))
        .await
        .map_err(from_blocking)?;

    info!("User {} ({}) deleted a file", user_id, principal.username);
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(register)
        .service(login)
        .service(upload)
        .service(download)
        .service(list_files)
        .service(delete_file);
}
