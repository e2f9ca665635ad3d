// Copyright 2023 Remi Bernotavicius

use super::{ApiError, ApiJson, ApiPath, AppState, MessageResponse};
use crate::database::models::RecipeId;
use crate::extract::ExtractedRecipe;
use crate::recipes::{RecipeChanges, RecipeDetail, RecipeDraft, RecipeSummary};
use axum::extract::{FromRequest as _, Multipart, Request, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RecipesResponse {
    pub recipes: Vec<RecipeSummary>,
}

#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub recipe: RecipeDetail,
}

#[derive(Debug, Serialize)]
pub struct CreateRecipeResponse {
    pub message: String,
    pub recipe_id: RecipeId,
}

#[derive(Debug, Serialize)]
pub struct UpdateRecipeResponse {
    pub message: String,
    pub recipe: RecipeId,
}

#[derive(Debug, Serialize)]
pub struct ProcessImageResponse {
    pub recipe: ExtractedRecipe,
}

pub async fn list_recipes(State(state): State<AppState>) -> Result<Json<RecipesResponse>, ApiError> {
    let recipes = state
        .with_connection(|conn, context| context.recipes.list_recipes(conn))
        .await?;
    Ok(Json(RecipesResponse { recipes }))
}

pub async fn get_recipe(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = state
        .with_connection(move |conn, context| context.recipes.get_recipe(conn, id))
        .await?;
    Ok(Json(RecipeResponse { recipe }))
}

pub async fn add_recipe(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<RecipeDraft>,
) -> Result<(StatusCode, Json<CreateRecipeResponse>), ApiError> {
    let recipe_id = state
        .with_connection(move |conn, context| context.recipes.create_recipe(conn, &draft))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateRecipeResponse {
            message: "Recipe added successfully".into(),
            recipe_id,
        }),
    ))
}

pub async fn edit_recipe(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RecipeId>,
    ApiJson(changes): ApiJson<RecipeChanges>,
) -> Result<Json<UpdateRecipeResponse>, ApiError> {
    let recipe = state
        .with_connection(move |conn, context| context.recipes.update_recipe(conn, id, &changes))
        .await?;
    Ok(Json(UpdateRecipeResponse {
        message: "Recipe updated successfully".into(),
        recipe,
    }))
}

pub async fn delete_recipe(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<RecipeId>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .with_connection(move |conn, context| context.recipes.delete_recipe(conn, id))
        .await?;
    Ok(MessageResponse::new("Recipe deleted successfully"))
}

/// Reads the `image` field of a multipart upload and asks the extractor for a recipe draft.
/// Nothing is stored.
pub async fn process_image(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ProcessImageResponse>, ApiError> {
    let mut multipart = Multipart::from_request(request, &state).await?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let content_type = field.content_type().unwrap_or("image/jpeg").to_owned();
            image = Some((field.bytes().await?, content_type));
            break;
        }
    }
    let (bytes, content_type) =
        image.ok_or_else(|| ApiError::BadRequest("No image uploaded".into()))?;

    let extractor = state
        .extractor
        .clone()
        .ok_or(ApiError::ExtractionUnavailable)?;
    let known_types = state
        .with_connection(|conn, context| context.recipes.list_recipe_types(conn))
        .await?;

    log::info!("extracting recipe from {} byte {content_type} upload", bytes.len());
    let recipe = extractor
        .extract(&bytes, &content_type, &known_types)
        .await?;
    Ok(Json(ProcessImageResponse { recipe }))
}
