//! User image uploads.
//!
//! Bodies are `multipart/form-data` with a `user` field (owner id) and an
//! `image` file field. Files land in the media root and are served under
//! `/files`.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::users::invalid_pk;
use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, FieldErrors, UserImageDto};
use crate::domain::Principal;
use crate::permissions::{Ownership, Permission, Resource};

struct UploadedFile {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

#[derive(Default)]
struct ImageForm {
    user: Option<String>,
    image: Option<UploadedFile>,
}

impl ImageForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("Multipart error: {e}")))?
        {
            match field.name().unwrap_or("") {
                "user" => {
                    form.user = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| ApiError::validation(format!("Multipart error: {e}")))?,
                    );
                }
                "image" => {
                    let filename = field.file_name().map(ToString::to_string);
                    let content_type = field.content_type().map(ToString::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation(format!("Failed to read file: {e}")))?;
                    form.image = Some(UploadedFile {
                        bytes,
                        filename,
                        content_type,
                    });
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

fn parse_user_field(raw: &str) -> Result<i32, FieldErrors> {
    raw.trim()
        .parse::<i32>()
        .map_err(|_| FieldErrors::single("user", "Incorrect type. Expected pk value."))
}

/// Resolves the owner named in the form and checks the principal may attach
/// images to it.
async fn resolve_owner(
    state: &AppState,
    principal: &Principal,
    raw: &str,
) -> Result<i32, ApiError> {
    let user_id = parse_user_field(raw)?;
    let owner = state
        .store()
        .user_repo()
        .get(user_id)
        .await?
        .ok_or_else(|| FieldErrors::single("user", invalid_pk(user_id)))?;

    state
        .policy()
        .can_add_image(principal, &Ownership::new(owner.id, owner.admin_id))?;
    Ok(owner.id)
}

async fn store_file(state: &AppState, file: &UploadedFile) -> Result<String, ApiError> {
    Ok(state
        .images()
        .save(
            &file.bytes,
            file.filename.as_deref(),
            file.content_type.as_deref(),
        )
        .await?)
}

/// GET /usersImage/
pub async fn list(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Result<Json<ApiResponse<Vec<UserImageDto>>>, ApiError> {
    state
        .policy()
        .require(&principal, Permission::view(Resource::UserImage))?;

    let images = state.store().image_repo().list_visible(&principal).await?;
    Ok(Json(ApiResponse::success(
        images.into_iter().map(UserImageDto::from).collect(),
    )))
}

/// POST /usersImage/
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<UserImageDto>>), ApiError> {
    state
        .policy()
        .require(&principal, Permission::add(Resource::UserImage))?;

    let form = ImageForm::read(multipart).await?;

    let mut errors = FieldErrors::new();
    if form.user.is_none() {
        errors.add("user", "This field is required.");
    }
    if form.image.is_none() {
        errors.add("image", "No file was submitted.");
    }
    errors.into_result()?;

    let (Some(raw_user), Some(file)) = (form.user, form.image) else {
        return Err(ApiError::validation("Incomplete form"));
    };

    let owner_id = resolve_owner(&state, &principal, &raw_user).await?;
    let path = store_file(&state, &file).await?;

    let image = match state.store().image_repo().create(owner_id, &path).await {
        Ok(image) => image,
        Err(e) => {
            state.images().remove(&path).await;
            return Err(e.into());
        }
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::success(image.into()))))
}

/// GET /usersImage/{id}/
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserImageDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::view(Resource::UserImage))?;

    let image = state
        .store()
        .image_repo()
        .get_visible(&principal, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Image", id))?;

    Ok(Json(ApiResponse::success(image.into())))
}

/// PATCH /usersImage/{id}/
///
/// Either field may be sent. A new file replaces the old one on disk.
pub async fn update(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<UserImageDto>>, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::change(Resource::UserImage))?;

    let (image, owner) = state
        .store()
        .image_repo()
        .get_with_owner(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Image", id))?;
    state.policy().can_change_image(&principal, &owner)?;

    let form = ImageForm::read(multipart).await?;

    let new_owner = match form.user.as_deref() {
        Some(raw) => Some(resolve_owner(&state, &principal, raw).await?),
        None => None,
    };
    let new_path = match form.image.as_ref() {
        Some(file) => Some(store_file(&state, file).await?),
        None => None,
    };

    let old_path = image.path.clone();
    let updated = match state
        .store()
        .image_repo()
        .update(image, new_owner, new_path.clone())
        .await
    {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(path) = new_path.as_deref() {
                state.images().remove(path).await;
            }
            return Err(e.into());
        }
    };

    if new_path.is_some() {
        state.images().remove(&old_path).await;
    }

    Ok(Json(ApiResponse::success(updated.into())))
}

/// DELETE /usersImage/{id}/
pub async fn destroy(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let id = validate_id(id)?;
    state
        .policy()
        .require(&principal, Permission::delete(Resource::UserImage))?;

    let (image, owner) = state
        .store()
        .image_repo()
        .get_with_owner(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Image", id))?;
    state.policy().can_delete_image(&principal, &owner)?;

    state.store().image_repo().delete(id).await?;
    state.images().remove(&image.path).await;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_field() {
        assert_eq!(parse_user_field(" 12 "), Ok(12));
        assert!(parse_user_field("abc").unwrap_err().contains("user"));
    }
}
