// Copyright 2023 Remi Bernotavicius

use crate::database::associations::{self, IngredientLineInput, UnknownTypePolicy};
use crate::database::models::{
    IngredientHandle, IngredientId, NewRecipe, Recipe, RecipeId, RecipeIngredient, RecipeType,
    RecipeTypeAssociation, RecipeTypeId,
};
use crate::database::{self, query, snapshot, unit_of_work};
use crate::error::{require_text, StoreError};
use diesel::prelude::{BelongingToDsl as _, GroupedBy as _};
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use serde::{Deserialize, Serialize};

/// A recipe together with its types and ingredients. `I` is the shape of each ingredient entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeView<I> {
    pub id: RecipeId,
    pub name: String,
    pub steps: String,
    pub types: Vec<RecipeType>,
    pub ingredients: Vec<I>,
}

/// Returned by the list endpoint: ingredients without quantities.
pub type RecipeSummary = RecipeView<IngredientHandle>;

/// Returned when fetching a single recipe: ingredients with amount and unit.
pub type RecipeDetail = RecipeView<IngredientAmount>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientAmount {
    pub id: IngredientId,
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

/// Body of a create request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub types: Vec<RecipeTypeId>,
    #[serde(default)]
    pub ingredients: Vec<IngredientLineInput>,
}

/// Body of an edit request. Omitted fields keep their stored value, and so do empty `types` or
/// `ingredients` lists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Option<String>,
    #[serde(default)]
    pub types: Option<Vec<RecipeTypeId>>,
    #[serde(default)]
    pub ingredients: Option<Vec<IngredientLineInput>>,
}

/// Reads and writes whole recipes. Every write runs as one unit of work.
#[derive(Debug, Default, Copy, Clone)]
pub struct RecipeService {
    pub unknown_types: UnknownTypePolicy,
}

impl RecipeService {
    pub fn new(unknown_types: UnknownTypePolicy) -> Self {
        Self { unknown_types }
    }

    pub fn list_recipes(
        &self,
        conn: &mut database::Connection,
    ) -> Result<Vec<RecipeSummary>, StoreError> {
        use database::schema::{ingredients, recipe_ingredients, recipe_types};

        snapshot(conn, |conn| {
            let recipes = query::list_recipes(conn)?;

            let types = RecipeTypeAssociation::belonging_to(&recipes)
                .inner_join(recipe_types::table)
                .select((RecipeTypeAssociation::as_select(), RecipeType::as_select()))
                .order(recipe_types::id)
                .load::<(RecipeTypeAssociation, RecipeType)>(conn)?
                .grouped_by(&recipes);

            let lines = RecipeIngredient::belonging_to(&recipes)
                .inner_join(ingredients::table)
                .select((RecipeIngredient::as_select(), IngredientHandle::as_select()))
                .order(recipe_ingredients::id)
                .load::<(RecipeIngredient, IngredientHandle)>(conn)?
                .grouped_by(&recipes);

            Ok(recipes
                .into_iter()
                .zip(types)
                .zip(lines)
                .map(|((recipe, types), lines)| RecipeView {
                    id: recipe.id,
                    name: recipe.name,
                    steps: recipe.steps,
                    types: types.into_iter().map(|(_, t)| t).collect(),
                    ingredients: lines.into_iter().map(|(_, i)| i).collect(),
                })
                .collect())
        })
    }

    pub fn get_recipe(
        &self,
        conn: &mut database::Connection,
        recipe_id: RecipeId,
    ) -> Result<RecipeDetail, StoreError> {
        use database::schema::{ingredients, recipe_ingredients, recipe_types};

        snapshot(conn, |conn| {
            let recipe = query::get_recipe(conn, recipe_id)?;

            let types = RecipeTypeAssociation::belonging_to(&recipe)
                .inner_join(recipe_types::table)
                .select(RecipeType::as_select())
                .order(recipe_types::id)
                .load(conn)?;

            let ingredients = RecipeIngredient::belonging_to(&recipe)
                .inner_join(ingredients::table)
                .select((RecipeIngredient::as_select(), IngredientHandle::as_select()))
                .order(recipe_ingredients::id)
                .load::<(RecipeIngredient, IngredientHandle)>(conn)?
                .into_iter()
                .map(|(line, ingredient)| IngredientAmount {
                    id: ingredient.id,
                    name: ingredient.name,
                    amount: line.amount,
                    unit: line.unit,
                })
                .collect();

            Ok(RecipeView {
                id: recipe.id,
                name: recipe.name,
                steps: recipe.steps,
                types,
                ingredients,
            })
        })
    }

    pub fn list_recipe_types(
        &self,
        conn: &mut database::Connection,
    ) -> Result<Vec<RecipeType>, StoreError> {
        query::list_recipe_types(conn)
    }

    /// Stores the recipe, links its types and inserts its ingredient lines in one transaction.
    pub fn create_recipe(
        &self,
        conn: &mut database::Connection,
        draft: &RecipeDraft,
    ) -> Result<RecipeId, StoreError> {
        let (Ok(name), Ok(steps), false) = (
            require_text(&draft.name, "Recipe name"),
            require_text(&draft.steps, "Recipe steps"),
            draft.ingredients.is_empty(),
        ) else {
            return Err(StoreError::Validation(
                "Recipe name, steps, and ingredients are required".into(),
            ));
        };
        let lines = associations::resolve_lines(&draft.ingredients)?;

        let recipe_id = unit_of_work(conn, |conn| {
            let recipe_id = query::add_recipe(
                conn,
                NewRecipe {
                    name: &name,
                    source: draft.source.as_deref().map(str::trim).unwrap_or_default(),
                    steps: &steps,
                },
            )?;
            associations::replace_types(conn, recipe_id, &draft.types, self.unknown_types)?;
            associations::replace_ingredient_lines(conn, recipe_id, &lines)?;
            Ok(recipe_id)
        })?;

        log::info!("created recipe {recipe_id} {name:?} with {} lines", lines.len());
        Ok(recipe_id)
    }

    /// Overwrites name and steps, clears the source and replaces whichever of types and
    /// ingredients were supplied non-empty. Nothing is kept if any part fails.
    pub fn update_recipe(
        &self,
        conn: &mut database::Connection,
        recipe_id: RecipeId,
        changes: &RecipeChanges,
    ) -> Result<RecipeId, StoreError> {
        unit_of_work(conn, |conn| {
            let current = query::get_recipe(conn, recipe_id)?;

            let name = match &changes.name {
                Some(name) => require_text(name, "Recipe name")?,
                None => current.name,
            };
            let steps = match &changes.steps {
                Some(steps) => require_text(steps, "Recipe steps")?,
                None => current.steps,
            };
            query::update_recipe(
                conn,
                &Recipe {
                    id: recipe_id,
                    name,
                    source: String::new(),
                    steps,
                },
            )?;

            if let Some(types) = changes.types.as_ref().filter(|t| !t.is_empty()) {
                associations::replace_types(conn, recipe_id, types, self.unknown_types)?;
            }
            if let Some(lines) = changes.ingredients.as_ref().filter(|l| !l.is_empty()) {
                let lines = associations::resolve_lines(lines)?;
                associations::replace_ingredient_lines(conn, recipe_id, &lines)?;
            }
            Ok(recipe_id)
        })?;

        log::info!("updated recipe {recipe_id}");
        Ok(recipe_id)
    }

    pub fn delete_recipe(
        &self,
        conn: &mut database::Connection,
        recipe_id: RecipeId,
    ) -> Result<(), StoreError> {
        query::delete_recipe(conn, recipe_id)?;
        log::info!("deleted recipe {recipe_id}");
        Ok(())
    }
}

#[cfg(test)]
use crate::database::associations::Amount;
#[cfg(test)]
use crate::database::models::Ingredient;
#[cfg(test)]
use maplit::btreeset;
#[cfg(test)]
use std::collections::BTreeSet;

#[cfg(test)]
struct Pantry {
    conn: database::Connection,
    flour: Ingredient,
    milk: Ingredient,
    egg: Ingredient,
    breakfast: RecipeType,
    dessert: RecipeType,
}

#[cfg(test)]
impl Pantry {
    fn new() -> Self {
        let mut conn = database::in_memory();
        let flour = query::add_ingredient(&mut conn, "Flour", None).unwrap();
        let milk = query::add_ingredient(&mut conn, "Milk", None).unwrap();
        let egg = query::add_ingredient(&mut conn, "Egg", None).unwrap();
        let breakfast = query::add_recipe_type(&mut conn, "Breakfast").unwrap();
        let dessert = query::add_recipe_type(&mut conn, "Dessert").unwrap();
        Self {
            conn,
            flour,
            milk,
            egg,
            breakfast,
            dessert,
        }
    }

    fn recipe_count(&mut self) -> i64 {
        database::schema::recipes::table
            .count()
            .get_result(&mut self.conn)
            .unwrap()
    }

    fn line_count(&mut self) -> i64 {
        database::schema::recipe_ingredients::table
            .count()
            .get_result(&mut self.conn)
            .unwrap()
    }
}

#[cfg(test)]
fn line(ingredient: &Ingredient, amount: &str, unit: &str) -> IngredientLineInput {
    IngredientLineInput {
        id: Some(ingredient.id),
        name: Some(ingredient.name.clone()),
        amount: Some(Amount::Text(amount.into())),
        unit: Some(unit.into()),
    }
}

#[cfg(test)]
fn type_ids(view: &RecipeDetail) -> BTreeSet<RecipeTypeId> {
    view.types.iter().map(|t| t.id).collect()
}

#[cfg(test)]
fn pancakes(breakfast: &RecipeType, flour: &Ingredient) -> RecipeDraft {
    RecipeDraft {
        name: "Pancakes".into(),
        steps: "Mix; Fry".into(),
        source: None,
        types: vec![breakfast.id],
        ingredients: vec![line(flour, "2", "cup")],
    }
}

#[test]
fn create_then_get_round_trips() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let draft = RecipeDraft {
        types: vec![pantry.dessert.id, pantry.breakfast.id],
        ingredients: vec![
            line(&pantry.flour, "2", "cup"),
            line(&pantry.egg, "3", "whole"),
            line(&pantry.milk, "0.5", "l"),
        ],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    let id = service.create_recipe(&mut pantry.conn, &draft).unwrap();

    let view = service.get_recipe(&mut pantry.conn, id).unwrap();
    assert_eq!(view.id, id);
    assert_eq!(view.name, "Pancakes");
    assert_eq!(view.steps, "Mix; Fry");
    assert_eq!(
        type_ids(&view),
        btreeset! {pantry.breakfast.id, pantry.dessert.id}
    );
    assert_eq!(
        view.ingredients,
        [
            IngredientAmount {
                id: pantry.flour.id,
                name: "Flour".into(),
                amount: 2.0,
                unit: "cup".into(),
            },
            IngredientAmount {
                id: pantry.egg.id,
                name: "Egg".into(),
                amount: 3.0,
                unit: "whole".into(),
            },
            IngredientAmount {
                id: pantry.milk.id,
                name: "Milk".into(),
                amount: 0.5,
                unit: "l".into(),
            },
        ]
    );
}

#[test]
fn detail_serializes_amounts() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();
    let view = service.get_recipe(&mut pantry.conn, id).unwrap();

    assert_eq!(
        serde_json::to_value(&view).unwrap(),
        serde_json::json!({
            "id": id,
            "name": "Pancakes",
            "steps": "Mix; Fry",
            "types": [{"id": pantry.breakfast.id, "name": "Breakfast"}],
            "ingredients": [
                {"id": pantry.flour.id, "name": "Flour", "amount": 2.0, "unit": "cup"}
            ],
        })
    );
}

#[test]
fn list_uses_summary_projection() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let first = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();
    let second = service
        .create_recipe(
            &mut pantry.conn,
            &RecipeDraft {
                name: "Custard".into(),
                steps: "Whisk; Bake".into(),
                source: Some("cookbook".into()),
                types: vec![pantry.dessert.id],
                ingredients: vec![line(&pantry.milk, "1", "l"), line(&pantry.egg, "4", "whole")],
            },
        )
        .unwrap();

    let recipes = service.list_recipes(&mut pantry.conn).unwrap();
    assert_eq!(recipes.len(), 2);

    assert_eq!(recipes[0].id, first);
    assert_eq!(recipes[0].types, [pantry.breakfast.clone()]);
    assert_eq!(
        recipes[0].ingredients,
        [IngredientHandle::from(pantry.flour.clone())]
    );

    assert_eq!(recipes[1].id, second);
    assert_eq!(recipes[1].types, [pantry.dessert.clone()]);
    assert_eq!(
        recipes[1].ingredients,
        [
            IngredientHandle::from(pantry.milk.clone()),
            IngredientHandle::from(pantry.egg.clone())
        ]
    );

    let json = serde_json::to_value(&recipes[1]).unwrap();
    assert_eq!(
        json["ingredients"][0],
        serde_json::json!({"id": pantry.milk.id, "name": "Milk"})
    );
}

#[test]
fn list_includes_recipes_without_lines() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let draft = RecipeDraft {
        types: vec![],
        ingredients: vec![IngredientLineInput::default()],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    service.create_recipe(&mut pantry.conn, &draft).unwrap();

    let recipes = service.list_recipes(&mut pantry.conn).unwrap();
    assert_eq!(recipes.len(), 1);
    assert!(recipes[0].types.is_empty());
    assert!(recipes[0].ingredients.is_empty());
}

#[test]
fn create_requires_name_steps_and_ingredients() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let drafts = [
        RecipeDraft {
            steps: String::new(),
            ..pancakes(&pantry.breakfast, &pantry.flour)
        },
        RecipeDraft {
            name: "   ".into(),
            ..pancakes(&pantry.breakfast, &pantry.flour)
        },
        RecipeDraft {
            ingredients: vec![],
            ..pancakes(&pantry.breakfast, &pantry.flour)
        },
    ];
    for draft in &drafts {
        let error = service.create_recipe(&mut pantry.conn, draft).unwrap_err();
        assert!(matches!(error, StoreError::Validation(_)), "{error}");
    }
    assert_eq!(pantry.recipe_count(), 0);
}

#[test]
fn create_with_unknown_ingredient_commits_nothing() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let draft = RecipeDraft {
        ingredients: vec![
            line(&pantry.flour, "2", "cup"),
            IngredientLineInput {
                id: Some(999.into()),
                name: Some("Saffron".into()),
                amount: Some(Amount::Number(1.0)),
                unit: Some("pinch".into()),
            },
        ],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    let error = service.create_recipe(&mut pantry.conn, &draft).unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));
    assert_eq!(pantry.recipe_count(), 0);
    assert_eq!(pantry.line_count(), 0);
}

#[test]
fn create_with_bad_amount_commits_nothing() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();

    let draft = RecipeDraft {
        ingredients: vec![line(&pantry.flour, "two", "cup")],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    let error = service.create_recipe(&mut pantry.conn, &draft).unwrap_err();
    assert!(matches!(error, StoreError::Validation(_)));
    assert_eq!(pantry.recipe_count(), 0);
}

#[test]
fn unknown_types_follow_policy() {
    let mut pantry = Pantry::new();

    let draft = RecipeDraft {
        types: vec![pantry.breakfast.id, 404.into()],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };

    let strict = RecipeService::new(UnknownTypePolicy::Fail);
    let error = strict.create_recipe(&mut pantry.conn, &draft).unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));
    assert_eq!(pantry.recipe_count(), 0);

    let lenient = RecipeService::new(UnknownTypePolicy::Skip);
    let id = lenient.create_recipe(&mut pantry.conn, &draft).unwrap();
    let view = lenient.get_recipe(&mut pantry.conn, id).unwrap();
    assert_eq!(type_ids(&view), btreeset! {pantry.breakfast.id});
}

#[test]
fn update_replaces_ingredient_lines() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();

    let changes = RecipeChanges {
        name: Some("Milk pancakes".into()),
        steps: Some("Whisk; Fry".into()),
        types: None,
        ingredients: Some(vec![line(&pantry.milk, "1", "cup")]),
    };
    assert_eq!(
        service.update_recipe(&mut pantry.conn, id, &changes).unwrap(),
        id
    );

    let view = service.get_recipe(&mut pantry.conn, id).unwrap();
    assert_eq!(view.name, "Milk pancakes");
    assert_eq!(view.steps, "Whisk; Fry");
    let ingredient_ids: Vec<_> = view.ingredients.iter().map(|i| i.id).collect();
    assert_eq!(ingredient_ids, [pantry.milk.id]);
    assert_eq!(type_ids(&view), btreeset! {pantry.breakfast.id});
}

#[test]
fn update_clears_source() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let draft = RecipeDraft {
        source: Some("grandma".into()),
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    let id = service.create_recipe(&mut pantry.conn, &draft).unwrap();
    assert_eq!(query::get_recipe(&mut pantry.conn, id).unwrap().source, "grandma");

    service
        .update_recipe(&mut pantry.conn, id, &RecipeChanges::default())
        .unwrap();
    let stored = query::get_recipe(&mut pantry.conn, id).unwrap();
    assert_eq!(stored.source, "");
    assert_eq!(stored.name, "Pancakes");
}

#[test]
fn update_leaves_omitted_or_empty_associations() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();

    for changes in [
        RecipeChanges::default(),
        RecipeChanges {
            types: Some(vec![]),
            ingredients: Some(vec![]),
            ..Default::default()
        },
    ] {
        service.update_recipe(&mut pantry.conn, id, &changes).unwrap();
        let view = service.get_recipe(&mut pantry.conn, id).unwrap();
        assert_eq!(type_ids(&view), btreeset! {pantry.breakfast.id});
        assert_eq!(view.ingredients.len(), 1);
    }

    let changes = RecipeChanges {
        types: Some(vec![pantry.dessert.id]),
        ..Default::default()
    };
    service.update_recipe(&mut pantry.conn, id, &changes).unwrap();
    let view = service.get_recipe(&mut pantry.conn, id).unwrap();
    assert_eq!(type_ids(&view), btreeset! {pantry.dessert.id});
    assert_eq!(view.ingredients[0].id, pantry.flour.id);
}

#[test]
fn failed_update_rolls_back_everything() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();
    let before = service.get_recipe(&mut pantry.conn, id).unwrap();

    let changes = RecipeChanges {
        name: Some("Waffles".into()),
        steps: None,
        types: Some(vec![pantry.dessert.id]),
        ingredients: Some(vec![
            line(&pantry.milk, "1", "cup"),
            IngredientLineInput {
                id: Some(999.into()),
                name: Some("Saffron".into()),
                amount: Some(Amount::Number(1.0)),
                unit: Some("pinch".into()),
            },
        ]),
    };
    let error = service
        .update_recipe(&mut pantry.conn, id, &changes)
        .unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));

    assert_eq!(service.get_recipe(&mut pantry.conn, id).unwrap(), before);
}

#[test]
fn update_rejects_blank_name_and_missing_recipe() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();

    let changes = RecipeChanges {
        name: Some(" ".into()),
        ..Default::default()
    };
    assert!(matches!(
        service.update_recipe(&mut pantry.conn, id, &changes),
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        service.update_recipe(&mut pantry.conn, 31337.into(), &RecipeChanges::default()),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn delete_removes_lines_but_keeps_ingredients_and_types() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let id = service
        .create_recipe(&mut pantry.conn, &pancakes(&pantry.breakfast, &pantry.flour))
        .unwrap();
    let kept = service
        .create_recipe(
            &mut pantry.conn,
            &RecipeDraft {
                name: "Crepes".into(),
                ..pancakes(&pantry.breakfast, &pantry.flour)
            },
        )
        .unwrap();

    service.delete_recipe(&mut pantry.conn, id).unwrap();

    let remaining: i64 = {
        use crate::database::schema::recipe_ingredients;
        use diesel::ExpressionMethods as _;

        recipe_ingredients::table
            .filter(recipe_ingredients::recipe_id.eq(id))
            .count()
            .get_result(&mut pantry.conn)
            .unwrap()
    };
    assert_eq!(remaining, 0);
    assert_eq!(pantry.line_count(), 1);
    assert!(matches!(
        service.get_recipe(&mut pantry.conn, id),
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(query::list_ingredients(&mut pantry.conn).unwrap().len(), 3);
    assert_eq!(
        service.list_recipe_types(&mut pantry.conn).unwrap(),
        [pantry.breakfast.clone(), pantry.dessert.clone()]
    );
    assert_eq!(service.get_recipe(&mut pantry.conn, kept).unwrap().name, "Crepes");

    assert!(matches!(
        service.delete_recipe(&mut pantry.conn, id),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn deleting_ingredient_keeps_recipe() {
    let mut pantry = Pantry::new();
    let service = RecipeService::default();
    let draft = RecipeDraft {
        ingredients: vec![line(&pantry.flour, "2", "cup"), line(&pantry.egg, "1", "whole")],
        ..pancakes(&pantry.breakfast, &pantry.flour)
    };
    let id = service.create_recipe(&mut pantry.conn, &draft).unwrap();

    query::delete_ingredient(&mut pantry.conn, pantry.flour.id).unwrap();

    let view = service.get_recipe(&mut pantry.conn, id).unwrap();
    let ingredient_ids: Vec<_> = view.ingredients.iter().map(|i| i.id).collect();
    assert_eq!(ingredient_ids, [pantry.egg.id]);
}
