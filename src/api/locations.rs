//! Read-only country / province / city catalogue.

use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use super::validation::validate_id;
use super::{ApiError, ApiResponse, AppState, CityDto, CountryDto, ProvinceDto};
use crate::domain::Principal;

/// GET /countries/
pub async fn list_countries(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
) -> Result<Json<ApiResponse<Vec<CountryDto>>>, ApiError> {
    let countries = state.store().location_repo().countries().await?;
    Ok(Json(ApiResponse::success(
        countries.into_iter().map(CountryDto::from).collect(),
    )))
}

/// GET /countries/{id}/provinces/
pub async fn list_provinces(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<ProvinceDto>>>, ApiError> {
    let id = validate_id(id)?;
    let provinces = state
        .store()
        .location_repo()
        .provinces(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Country", id))?;
    Ok(Json(ApiResponse::success(
        provinces.into_iter().map(ProvinceDto::from).collect(),
    )))
}

/// GET /provinces/{id}/cities/
pub async fn list_cities(
    State(state): State<Arc<AppState>>,
    _principal: Principal,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<CityDto>>>, ApiError> {
    let id = validate_id(id)?;
    let cities = state
        .store()
        .location_repo()
        .cities(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Province", id))?;
    Ok(Json(ApiResponse::success(
        cities.into_iter().map(CityDto::from).collect(),
    )))
}
