// Copyright 2023 Remi Bernotavicius

use super::*;
use crate::database::associations::UnknownTypePolicy;
use crate::database::models::RecipeType;
use crate::extract::{ExtractedIngredient, ExtractedRecipe};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use serde_json::{json, Value};
use tower::ServiceExt as _;

const ORIGIN: &str = "http://localhost:5173";

struct FakeExtractor;

#[async_trait]
impl RecipeExtractor for FakeExtractor {
    async fn extract(
        &self,
        image: &[u8],
        content_type: &str,
        known_types: &[RecipeType],
    ) -> Result<ExtractedRecipe, ExtractError> {
        Ok(ExtractedRecipe {
            name: format!("{} bytes of {content_type}", image.len()),
            types: known_types.to_vec(),
            ingredients: vec![ExtractedIngredient {
                name: "Flour".into(),
                amount: "2".into(),
                unit: "cup".into(),
            }],
            steps: "Mix\nFry".into(),
        })
    }
}

struct RejectingExtractor;

#[async_trait]
impl RecipeExtractor for RejectingExtractor {
    async fn extract(
        &self,
        _image: &[u8],
        _content_type: &str,
        _known_types: &[RecipeType],
    ) -> Result<ExtractedRecipe, ExtractError> {
        Err(ExtractError::Upstream {
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "invalid api key gsk_secret".into(),
        })
    }
}

struct TestServer {
    _dir: tempfile::TempDir,
    router: Router,
}

impl TestServer {
    fn new(extractor: Option<Arc<dyn RecipeExtractor>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = database::create_pool(dir.path().join("data.sqlite")).unwrap();
        let state = Arc::new(AppContext {
            pool,
            recipes: RecipeService::new(UnknownTypePolicy::Skip),
            default_category: IngredientCategoryId::UNCATEGORIZED,
            extractor,
        });
        Self {
            _dir: dir,
            router: router(state, ORIGIN).unwrap(),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::delete(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn add(&self, uri: &str, body: Value) -> Value {
        let (status, body) = self.json(Method::POST, uri, body).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

fn multipart(field: &str, content: &[u8]) -> Request<Body> {
    const BOUNDARY: &str = "recipe-boundary";
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
         filename=\"card.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/recipes/process-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn pancakes_round_trip() {
    let server = TestServer::new(None);
    let flour = server.add("/api/ingredients/add", json!({"name": "Flour"})).await;
    let breakfast = server.add("/api/types/add", json!({"name": "Breakfast"})).await;
    let flour_id = flour["ingredient"]["id"].clone();
    let breakfast_id = breakfast["type"]["id"].clone();
    assert_eq!(flour["ingredient"], json!({"id": flour_id, "name": "Flour"}));

    let created = server
        .add(
            "/api/recipes/add",
            json!({
                "name": "Pancakes",
                "steps": "Mix; Fry",
                "types": [breakfast_id],
                "ingredients": [
                    {"id": flour_id, "name": "Flour", "amount": "2", "unit": "cup"}
                ],
            }),
        )
        .await;
    assert_eq!(created["message"], "Recipe added successfully");
    let recipe_id = created["recipe_id"].as_i64().unwrap();

    let (status, body) = server.get(&format!("/api/recipes/{recipe_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"recipe": {
            "id": recipe_id,
            "name": "Pancakes",
            "steps": "Mix; Fry",
            "types": [{"id": breakfast_id, "name": "Breakfast"}],
            "ingredients": [{"id": flour_id, "name": "Flour", "amount": 2.0, "unit": "cup"}],
        }})
    );

    for uri in ["/api/recipes", "/api/recipes/"] {
        let (status, body) = server.get(uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["recipes"][0]["ingredients"],
            json!([{"id": flour_id, "name": "Flour"}])
        );
    }
}

#[tokio::test]
async fn create_validation_and_missing_ingredient() {
    let server = TestServer::new(None);

    let (status, body) = server
        .json(
            Method::POST,
            "/api/recipes/add",
            json!({"name": "Pancakes", "ingredients": []}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Recipe name, steps, and ingredients are required");

    let (status, body) = server
        .json(
            Method::POST,
            "/api/recipes/add",
            json!({
                "name": "Pancakes",
                "steps": "Mix",
                "ingredients": [{"id": 77, "name": "Saffron", "amount": 1, "unit": "pinch"}],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Ingredient 'Saffron' not found");

    let (_, body) = server.get("/api/recipes").await;
    assert_eq!(body, json!({"recipes": []}));
}

#[tokio::test]
async fn malformed_bodies_are_rejected() {
    let server = TestServer::new(None);

    let (status, body) = server
        .send(
            Request::post("/api/recipes/add")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = server
        .json(
            Method::POST,
            "/api/recipes/add",
            json!({"name": "Pancakes", "steps": "Mix", "ingredients": [], "serves": 4}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("serves"));

    let (status, body) = server.get("/api/recipes/pancakes").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn edit_and_delete_recipe() {
    let server = TestServer::new(None);
    let flour = server.add("/api/ingredients/add", json!({"name": "Flour"})).await;
    let milk = server.add("/api/ingredients/add", json!({"name": "Milk"})).await;
    let created = server
        .add(
            "/api/recipes/add",
            json!({
                "name": "Pancakes",
                "steps": "Mix",
                "ingredients": [
                    {"id": flour["ingredient"]["id"], "name": "Flour", "amount": 2, "unit": "cup"}
                ],
            }),
        )
        .await;
    let recipe_id = created["recipe_id"].as_i64().unwrap();

    let (status, body) = server
        .json(
            Method::PUT,
            &format!("/api/recipes/edit/{recipe_id}"),
            json!({
                "name": "Milk pancakes",
                "ingredients": [
                    {"id": milk["ingredient"]["id"], "name": "Milk", "amount": "1", "unit": "cup"}
                ],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"message": "Recipe updated successfully", "recipe": recipe_id})
    );

    let (_, body) = server.get(&format!("/api/recipes/{recipe_id}")).await;
    assert_eq!(body["recipe"]["name"], "Milk pancakes");
    assert_eq!(body["recipe"]["steps"], "Mix");
    assert_eq!(body["recipe"]["ingredients"][0]["name"], "Milk");

    let (status, _) = server
        .json(Method::PUT, "/api/recipes/edit/999", json!({"name": "Waffles"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = server
        .delete(&format!("/api/recipes/delete/{recipe_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Recipe deleted successfully");

    let (status, _) = server.get(&format!("/api/recipes/{recipe_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server
        .delete(&format!("/api/recipes/delete/{recipe_id}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = server.get("/api/ingredients").await;
    assert_eq!(body["ingredients"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn ingredients_types_and_categories() {
    let server = TestServer::new(None);

    let dairy = server
        .add("/api/ingredient-categories/add", json!({"name": "Dairy"}))
        .await;
    let dairy_id = dairy["category"]["id"].clone();
    let (status, _) = server
        .json(
            Method::POST,
            "/api/ingredient-categories/add",
            json!({"name": "Dairy"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, body) = server.get("/api/ingredient-categories").await;
    assert_eq!(
        body["categories"],
        json!([{"id": 1, "name": "Uncategorized"}, {"id": dairy_id, "name": "Dairy"}])
    );

    let milk = server
        .add(
            "/api/ingredients/add",
            json!({"name": "Milk", "category_id": dairy_id}),
        )
        .await;
    let milk_id = milk["ingredient"]["id"].as_i64().unwrap();
    let salt = server.add("/api/ingredients/add", json!({"name": "Salt"})).await;
    let salt_id = salt["ingredient"]["id"].as_i64().unwrap();

    let (status, body) = server
        .json(
            Method::PUT,
            &format!("/api/ingredients/edit/{salt_id}"),
            json!({"name": "Sea salt"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["ingredient"],
        json!({"id": salt_id, "name": "Sea salt", "category_id": 1})
    );

    let (status, body) = server
        .json(
            Method::PUT,
            &format!("/api/ingredients/edit/{milk_id}"),
            json!({"name": "Whole milk"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["ingredient"],
        json!({"id": milk_id, "name": "Whole milk", "category_id": dairy_id})
    );

    let (status, _) = server
        .json(
            Method::POST,
            "/api/ingredients/add",
            json!({"name": "Cheese", "category_id": 404}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .delete(&format!("/api/ingredients/delete/{milk_id}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get("/api/ingredients").await;
    assert_eq!(
        body,
        json!({"ingredients": [{"id": salt_id, "name": "Sea salt"}]})
    );

    let soup = server.add("/api/types/add", json!({"name": "Soup"})).await;
    let (status, body) = server
        .get(&format!("/api/types/{}", soup["type"]["id"]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, soup);
    let (status, body) = server
        .json(Method::POST, "/api/types/add", json!({"name": "Soup"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Recipe type 'Soup' already exists");

    let (status, _) = server
        .delete(&format!("/api/types/delete/{}", soup["type"]["id"]))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = server.get("/api/types").await;
    assert_eq!(body, json!({"types": []}));
    let (status, _) = server
        .get(&format!("/api/types/{}", soup["type"]["id"]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn process_image_uses_extractor() {
    let server = TestServer::new(Some(Arc::new(FakeExtractor)));
    server.add("/api/types/add", json!({"name": "Breakfast"})).await;

    let (status, body) = server.send(multipart("image", b"\x89PNG")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recipe"]["name"], "4 bytes of image/png");
    assert_eq!(body["recipe"]["types"][0]["name"], "Breakfast");
    assert_eq!(body["recipe"]["steps"], "Mix\nFry");

    let (status, body) = server.send(multipart("photo", b"\x89PNG")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image uploaded");

    let (_, body) = server.get("/api/recipes").await;
    assert_eq!(body, json!({"recipes": []}));
}

#[tokio::test]
async fn process_image_without_extractor() {
    let server = TestServer::new(None);
    let (status, body) = server.send(multipart("image", b"\xff\xd8")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "image extraction is not configured");
}

#[tokio::test]
async fn process_image_hides_upstream_failure() {
    let server = TestServer::new(Some(Arc::new(RejectingExtractor)));
    let (status, body) = server.send(multipart("image", b"\xff\xd8")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"error": "Image extraction failed"}));
}

#[tokio::test]
async fn missing_recipe_is_not_found() {
    let server = TestServer::new(None);
    let (status, body) = server.get("/api/recipes/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("999"), "{body}");
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let server = TestServer::new(None);
    let response = server
        .router
        .clone()
        .oneshot(
            Request::get("/api/types")
                .header(header::ORIGIN, ORIGIN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        ORIGIN
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
}
