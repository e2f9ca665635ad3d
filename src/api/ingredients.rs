// Copyright 2023 Remi Bernotavicius

use super::{ApiError, ApiJson, ApiPath, AppState, MessageResponse};
use crate::database::models::{Ingredient, IngredientCategoryId, IngredientHandle, IngredientId};
use crate::database::{query, unit_of_work};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct IngredientsResponse {
    pub ingredients: Vec<IngredientHandle>,
}

#[derive(Debug, Serialize)]
pub struct AddIngredientResponse {
    pub ingredient: IngredientHandle,
}

#[derive(Debug, Serialize)]
pub struct IngredientResponse {
    pub ingredient: Ingredient,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddIngredientRequest {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<IngredientCategoryId>,
}

/// Omitting `category_id` keeps the current category.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditIngredientRequest {
    pub name: String,
    #[serde(default)]
    pub category_id: Option<IngredientCategoryId>,
}

pub async fn list_ingredients(
    State(state): State<AppState>,
) -> Result<Json<IngredientsResponse>, ApiError> {
    let ingredients = state
        .with_connection(|conn, _| query::list_ingredients(conn))
        .await?;
    Ok(Json(IngredientsResponse {
        ingredients: ingredients.into_iter().map(IngredientHandle::from).collect(),
    }))
}

pub async fn add_ingredient(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AddIngredientRequest>,
) -> Result<(StatusCode, Json<AddIngredientResponse>), ApiError> {
    let ingredient = state
        .with_connection(move |conn, context| {
            let category = request.category_id.unwrap_or(context.default_category);
            query::add_ingredient(conn, &request.name, Some(category))
        })
        .await?;
    log::info!("added ingredient {} {:?}", ingredient.id, ingredient.name);
    Ok((
        StatusCode::CREATED,
        Json(AddIngredientResponse {
            ingredient: ingredient.into(),
        }),
    ))
}

pub async fn edit_ingredient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<IngredientId>,
    ApiJson(request): ApiJson<EditIngredientRequest>,
) -> Result<Json<IngredientResponse>, ApiError> {
    let ingredient = state
        .with_connection(move |conn, _| {
            unit_of_work(conn, |conn| {
                let current = query::get_ingredient(conn, id)?;
                query::update_ingredient(
                    conn,
                    &Ingredient {
                        id,
                        name: request.name,
                        category_id: request.category_id.or(current.category_id),
                    },
                )?;
                query::get_ingredient(conn, id)
            })
        })
        .await?;
    Ok(Json(IngredientResponse { ingredient }))
}

pub async fn delete_ingredient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<IngredientId>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .with_connection(move |conn, _| query::delete_ingredient(conn, id))
        .await?;
    log::info!("deleted ingredient {id}");
    Ok(MessageResponse::new("Ingredient deleted successfully"))
}
