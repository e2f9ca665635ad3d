// Copyright 2023 Remi Bernotavicius

use super::{ApiError, ApiJson, ApiPath, AppState, MessageResponse};
use crate::database::models::{RecipeType, RecipeTypeId};
use crate::database::query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub types: Vec<RecipeType>,
}

#[derive(Debug, Serialize)]
pub struct TypeResponse {
    #[serde(rename = "type")]
    pub recipe_type: RecipeType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTypeRequest {
    pub name: String,
}

pub async fn list_types(State(state): State<AppState>) -> Result<Json<TypesResponse>, ApiError> {
    let types = state
        .with_connection(|conn, context| context.recipes.list_recipe_types(conn))
        .await?;
    Ok(Json(TypesResponse { types }))
}

pub async fn get_type(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RecipeTypeId>,
) -> Result<Json<TypeResponse>, ApiError> {
    let recipe_type = state
        .with_connection(move |conn, _| query::get_recipe_type(conn, id))
        .await?;
    Ok(Json(TypeResponse { recipe_type }))
}

pub async fn add_type(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AddTypeRequest>,
) -> Result<(StatusCode, Json<TypeResponse>), ApiError> {
    let recipe_type = state
        .with_connection(move |conn, _| query::add_recipe_type(conn, &request.name))
        .await?;
    Ok((StatusCode::CREATED, Json(TypeResponse { recipe_type })))
}

pub async fn delete_type(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RecipeTypeId>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .with_connection(move |conn, _| query::delete_recipe_type(conn, id))
        .await?;
    Ok(MessageResponse::new("Recipe type deleted successfully"))
}
