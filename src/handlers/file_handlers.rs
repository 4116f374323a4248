//! HTTP handlers for file upload, deletion and listing.
//! Multipart bodies are handed to `FileService` part by part without
//! buffering; results are encoded as JSON.

use crate::{
    errors::AppError,
    middleware::auth::AuthUser,
    models::object::FolderInfo,
    services::file_service::FileService,
};
use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartRejection,
        path::ErrorKind,
        rejection::PathRejection,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<String>,
}

/// Query params accepted by `GET /objects/exists`.
#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub folder: Option<String>,
}

/// Turn a path extraction failure into a 400 naming the offending parameter
/// when axum reports one.
fn path_error(rejection: PathRejection, fallback: &str) -> AppError {
    let field = match &rejection {
        PathRejection::FailedToDeserializePathParams(err) => match err.kind() {
            ErrorKind::InvalidUtf8InPathParam { key }
            | ErrorKind::ParseErrorAtKey { key, .. }
            | ErrorKind::DeserializeError { key, .. } => key.clone(),
            _ => fallback.to_string(),
        },
        _ => fallback.to_string(),
    };
    AppError::bad_request("invalid path parameter").with_detail(field, rejection.body_text())
}

/// POST `/upload/{id}`: store every file part under `photos/{id}/`.
pub async fn upload_files(
    State(service): State<FileService>,
    id: Result<Path<String>, PathRejection>,
    user: Option<Extension<AuthUser>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Path(id) = id.map_err(|rejection| path_error(rejection, "id"))?;
    let mut multipart = multipart.map_err(|rejection| {
        AppError::bad_request("failed to read multipart data")
            .with_detail("multipart_data", rejection.body_text())
    })?;

    let uploaded = service.upload(&id, &mut multipart).await?;
    info!(
        %id,
        files = uploaded.len(),
        user_id = user.map(|Extension(user)| user.user_id),
        "upload batch stored"
    );

    Ok(Json(UploadResponse {
        urls: uploaded.into_iter().map(|obj| obj.url).collect(),
    }))
}

/// DELETE `/upload/{id}`: remove every file of the entity.
pub async fn delete_entity_files(
    State(service): State<FileService>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Path(id) = id.map_err(|rejection| path_error(rejection, "id"))?;
    service.delete_entity(&id).await?;

    Ok(Json(DeleteResponse {
        message: "all files deleted".into(),
        keys: None,
    }))
}

/// DELETE `/upload/{id}/{sub_id}`: remove the files whose token starts with `sub_id`.
pub async fn delete_sub_id_files(
    State(service): State<FileService>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Path((id, sub_id)) = path.map_err(|rejection| path_error(rejection, "path"))?;
    let keys = service.delete_by_sub_id(&id, &sub_id).await?;

    Ok(Json(DeleteResponse {
        message: "file(s) deleted by sub-id".into(),
        keys: Some(keys),
    }))
}

/// GET `/objects`: public URLs of every object in the bucket.
pub async fn list_objects(
    State(service): State<FileService>,
) -> Result<Json<FilesResponse>, AppError> {
    let files = service.list_all().await?;
    Ok(Json(FilesResponse { files }))
}

/// GET `/objects/exists?folder=`: existence and contents of a folder prefix.
pub async fn folder_info(
    State(service): State<FileService>,
    Query(q): Query<FolderQuery>,
) -> Result<Json<FolderInfo>, AppError> {
    let folder = q.folder.unwrap_or_default();
    let info = service.folder_info(&folder).await?;

    if !info.exists {
        return Err(AppError::not_found(format!("folder `{}` not found", info.folder)));
    }
    Ok(Json(info))
}
