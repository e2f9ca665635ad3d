// Copyright 2023 Remi Bernotavicius

//! Turns a photo of a recipe into a draft the client can review before saving it.

use crate::database::models::{RecipeType, RecipeTypeId};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const VISION_MODEL: &str = "llama-3.2-90b-vision-preview";
const JSON_MODEL: &str = "llama-3.3-70b-versatile";
const MAX_COMPLETION_TOKENS: u32 = 1024;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("request to extraction service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction service returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("extraction service returned no content")]
    EmptyResponse,

    #[error("extraction service returned invalid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedIngredient {
    pub name: String,
    pub amount: String,
    pub unit: String,
}

/// Best-effort recipe read from an image. Types are limited to ones that already exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedRecipe {
    pub name: String,
    pub types: Vec<RecipeType>,
    pub ingredients: Vec<ExtractedIngredient>,
    pub steps: String,
}

#[async_trait]
pub trait RecipeExtractor: Send + Sync {
    async fn extract(
        &self,
        image: &[u8],
        content_type: &str,
        known_types: &[RecipeType],
    ) -> Result<ExtractedRecipe, ExtractError>;
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn match_type(value: &Value, known_types: &[RecipeType]) -> Option<RecipeType> {
    let by_id = value
        .get("id")
        .and_then(text)
        .and_then(|id| id.parse::<i32>().ok())
        .and_then(|id| known_types.iter().find(|t| t.id == RecipeTypeId::from(id)));
    let by_name = || {
        let name = value.get("name").and_then(text).or_else(|| text(value))?;
        known_types
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(&name))
    };
    by_id.or_else(by_name).cloned()
}

fn coerce_ingredient(value: &Value) -> Option<ExtractedIngredient> {
    let name = value.get("name").and_then(text).filter(|n| !n.is_empty())?;
    Some(ExtractedIngredient {
        name,
        amount: value.get("amount").and_then(text).unwrap_or_default(),
        unit: value.get("unit").and_then(text).unwrap_or_default(),
    })
}

/// Reads whatever the model produced into an [`ExtractedRecipe`], dropping what doesn't fit.
/// Accepts either `{"recipe": {...}}` or the recipe object itself.
pub fn coerce_recipe(value: &Value, known_types: &[RecipeType]) -> ExtractedRecipe {
    let recipe = value.get("recipe").unwrap_or(value);

    let steps = match recipe.get("steps") {
        Some(Value::Array(steps)) => steps
            .iter()
            .filter_map(text)
            .collect::<Vec<_>>()
            .join("\n"),
        Some(steps) => text(steps).unwrap_or_default(),
        None => String::new(),
    };

    let mut types: Vec<RecipeType> = recipe
        .get("types")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| match_type(t, known_types))
        .collect();
    types.sort_by_key(|t| t.id);
    types.dedup();

    ExtractedRecipe {
        name: recipe.get("name").and_then(text).unwrap_or_default(),
        types,
        ingredients: recipe
            .get("ingredients")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(coerce_ingredient)
            .collect(),
        steps,
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

/// Talks to Groq's OpenAI-compatible chat completions API.
pub struct GroqExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GroqExtractor {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        }
    }

    async fn complete(&self, request: Value) -> Result<String, ExtractError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".into());
            return Err(ExtractError::Upstream { status, body });
        }

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ExtractError::EmptyResponse)
    }

    async fn transcribe(&self, image: &[u8], content_type: &str) -> Result<String, ExtractError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        self.complete(json!({
            "model": VISION_MODEL,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "Extract all text from the image"},
                    {
                        "type": "image_url",
                        "image_url": {"url": format!("data:{content_type};base64,{encoded}")},
                    },
                ],
            }],
            "max_completion_tokens": MAX_COMPLETION_TOKENS,
            "stream": false,
        }))
        .await
    }

    async fn structure(
        &self,
        recipe_text: &str,
        known_types: &[RecipeType],
    ) -> Result<Value, ExtractError> {
        let shape = json!({
            "recipe": {
                "name": "",
                "types": [{"id": "", "name": ""}],
                "ingredients": [{"name": "", "amount": "", "unit": ""}],
                "steps": "",
            }
        });
        let prompt = format!(
            "Convert this recipe into JSON.\n\nRecipe: {recipe_text}\n\n\
             Types must be chosen from: {types}\n\
             Amounts are plain decimal numbers, units may be empty, \
             steps are separated by newlines.\n\
             Use exactly this structure: {shape}",
            types = serde_json::to_string(known_types)?,
        );
        let content = self
            .complete(json!({
                "model": JSON_MODEL,
                "messages": [{"role": "user", "content": prompt}],
                "max_completion_tokens": MAX_COMPLETION_TOKENS,
                "stream": false,
                "response_format": {"type": "json_object"},
            }))
            .await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl RecipeExtractor for GroqExtractor {
    async fn extract(
        &self,
        image: &[u8],
        content_type: &str,
        known_types: &[RecipeType],
    ) -> Result<ExtractedRecipe, ExtractError> {
        let recipe_text = self.transcribe(image, content_type).await?;
        log::debug!("transcribed {} bytes of recipe text", recipe_text.len());
        let value = self.structure(&recipe_text, known_types).await?;
        Ok(coerce_recipe(&value, known_types))
    }
}

#[cfg(test)]
fn recipe_type(id: i32, name: &str) -> RecipeType {
    RecipeType {
        id: id.into(),
        name: name.into(),
    }
}

#[test]
fn coerce_reads_loose_model_output() {
    let known = [recipe_type(1, "Breakfast"), recipe_type(2, "Dessert")];
    let value = json!({
        "recipe": {
            "name": " Pancakes ",
            "types": [
                {"id": "2", "name": "Sweet"},
                {"id": "", "name": "breakfast"},
                {"id": 9, "name": "Soup"},
                "Dessert",
            ],
            "ingredients": [
                {"name": "Flour", "amount": 2, "unit": "cup"},
                {"name": "Salt", "amount": "0.5"},
                {"name": "", "amount": "1", "unit": "cup"},
                "sugar",
            ],
            "steps": ["Mix", "Fry"],
        }
    });

    let recipe = coerce_recipe(&value, &known);
    assert_eq!(recipe.name, "Pancakes");
    assert_eq!(recipe.types, known);
    assert_eq!(
        recipe.ingredients,
        [
            ExtractedIngredient {
                name: "Flour".into(),
                amount: "2".into(),
                unit: "cup".into(),
            },
            ExtractedIngredient {
                name: "Salt".into(),
                amount: "0.5".into(),
                unit: "".into(),
            },
        ]
    );
    assert_eq!(recipe.steps, "Mix\nFry");
}

#[test]
fn coerce_tolerates_garbage() {
    let recipe = coerce_recipe(&json!({"types": "none", "ingredients": 4}), &[]);
    assert_eq!(recipe, ExtractedRecipe::default());

    let recipe = coerce_recipe(&json!({"name": "Soup", "steps": "Boil"}), &[]);
    assert_eq!(recipe.name, "Soup");
    assert_eq!(recipe.steps, "Boil");
}

#[tokio::test]
async fn groq_extractor_transcribes_then_structures() {
    use axum::{routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    let requests = Arc::new(Mutex::new(Vec::<Value>::new()));
    let seen = requests.clone();
    let app = Router::new().route(
        "/chat/completions",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                let content = if body["model"] == VISION_MODEL {
                    "Pancakes. Flour 2 cup. Mix then fry.".to_owned()
                } else {
                    json!({"recipe": {
                        "name": "Pancakes",
                        "types": [{"id": 1, "name": "Breakfast"}],
                        "ingredients": [{"name": "Flour", "amount": "2", "unit": "cup"}],
                        "steps": "Mix\nFry",
                    }})
                    .to_string()
                };
                seen.lock().unwrap().push(body);
                Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let extractor = GroqExtractor::new(format!("http://{addr}/"), "key");
    let known = [recipe_type(1, "Breakfast")];
    let recipe = extractor
        .extract(b"\x89PNG", "image/png", &known)
        .await
        .unwrap();

    assert_eq!(recipe.name, "Pancakes");
    assert_eq!(recipe.types, known);
    assert_eq!(recipe.ingredients.len(), 1);

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let image_url = requests[0]["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap();
    assert_eq!(image_url, "data:image/png;base64,iVBORw==");
    assert_eq!(requests[1]["response_format"]["type"], "json_object");
}

#[tokio::test]
async fn groq_extractor_reports_upstream_errors() {
    use axum::{http::StatusCode, routing::post, Router};

    let app = Router::new().route(
        "/chat/completions",
        post(|| async { (StatusCode::UNAUTHORIZED, "invalid api key") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let extractor = GroqExtractor::new(format!("http://{addr}"), "bad");
    let error = extractor.extract(b"", "image/jpeg", &[]).await.unwrap_err();
    assert!(matches!(
        error,
        ExtractError::Upstream { status, ref body }
            if status == reqwest::StatusCode::UNAUTHORIZED && body == "invalid api key"
    ));
}
