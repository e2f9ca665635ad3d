// Copyright 2023 Remi Bernotavicius

//! Keeps the recipe ↔ type links and the recipe ingredient lines in step with a desired state.
//! Both replacements clear the existing rows for the recipe and rebuild them.

use crate::database;
use crate::database::models::{
    IngredientId, NewRecipeIngredient, RecipeId, RecipeTypeAssociation, RecipeTypeId,
};
use crate::error::StoreError;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do with a type id that names no existing recipe type.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum UnknownTypePolicy {
    /// Leave the id out and keep going.
    #[default]
    Skip,
    /// Fail the whole write with `NotFound`.
    Fail,
}

/// A numeric amount as clients send it, either a JSON number or a string like `"2"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

/// One ingredient line of a create or edit request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngredientLineInput {
    #[serde(default)]
    pub id: Option<IngredientId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// A line that survived [`resolve_lines`] and is ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct IngredientLine {
    pub ingredient_id: Option<IngredientId>,
    pub name: String,
    pub amount: f64,
    pub unit: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_amount(name: &str, amount: &Amount) -> Result<Option<f64>, StoreError> {
    let value = match amount {
        Amount::Number(n) => *n,
        Amount::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>().map_err(|_| {
                StoreError::Validation(format!(
                    "Amount '{text}' of ingredient '{name}' is not a number"
                ))
            })?
        }
    };
    if !value.is_finite() {
        return Err(StoreError::Validation(format!(
            "Amount of ingredient '{name}' is not a number"
        )));
    }
    Ok((value != 0.0).then_some(value))
}

/// The single line policy for both creating and editing a recipe.
///
/// A line whose name, amount or unit is missing or blank, or whose amount is zero, is dropped.
/// An amount that is present but not a finite number fails the whole request.
pub fn resolve_lines(lines: &[IngredientLineInput]) -> Result<Vec<IngredientLine>, StoreError> {
    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let (Some(name), Some(amount), Some(unit)) = (
            non_blank(line.name.as_deref()),
            line.amount.as_ref(),
            non_blank(line.unit.as_deref()),
        ) else {
            log::debug!("skipping incomplete ingredient line {line:?}");
            continue;
        };
        let Some(amount) = parse_amount(name, amount)? else {
            log::debug!("skipping ingredient line {name:?} without an amount");
            continue;
        };
        resolved.push(IngredientLine {
            ingredient_id: line.id,
            name: name.to_owned(),
            amount,
            unit: unit.to_owned(),
        });
    }
    Ok(resolved)
}

/// Clears every type link of the recipe, then links it to each id in `type_ids`.
///
/// Returns the ids that were linked. Ids with no matching recipe type are handled per `policy`.
pub fn replace_types(
    conn: &mut database::Connection,
    for_recipe: RecipeId,
    type_ids: &[RecipeTypeId],
    policy: UnknownTypePolicy,
) -> Result<Vec<RecipeTypeId>, StoreError> {
    let wanted: BTreeSet<RecipeTypeId> = type_ids.iter().copied().collect();
    let existing: BTreeSet<RecipeTypeId> = {
        use database::schema::recipe_types::dsl::*;

        recipe_types
            .filter(id.eq_any(wanted.iter().copied()))
            .select(id)
            .load::<RecipeTypeId>(conn)?
            .into_iter()
            .collect()
    };

    if let Some(unknown) = wanted.difference(&existing).next() {
        match policy {
            UnknownTypePolicy::Skip => {
                for unknown in wanted.difference(&existing) {
                    log::warn!("recipe {for_recipe}: skipping unknown recipe type {unknown}");
                }
            }
            UnknownTypePolicy::Fail => {
                return Err(StoreError::not_found(format!("Recipe type {unknown}")));
            }
        }
    }

    use database::schema::recipe_type_associations::dsl::*;

    diesel::delete(recipe_type_associations.filter(recipe_id.eq(for_recipe))).execute(conn)?;
    for &linked in &existing {
        diesel::insert_into(recipe_type_associations)
            .values(RecipeTypeAssociation {
                recipe_id: for_recipe,
                type_id: linked,
            })
            .execute(conn)?;
    }
    Ok(existing.into_iter().collect())
}

/// Deletes every ingredient line of the recipe, then stores `lines` in order.
///
/// Fails with `NotFound` when a line names an ingredient that does not exist; the caller's
/// unit of work then discards the partial replacement.
pub fn replace_ingredient_lines(
    conn: &mut database::Connection,
    for_recipe: RecipeId,
    lines: &[IngredientLine],
) -> Result<(), StoreError> {
    use database::schema::recipe_ingredients::dsl::*;

    diesel::delete(recipe_ingredients.filter(recipe_id.eq(for_recipe))).execute(conn)?;

    for line in lines {
        let missing = || StoreError::NotFound(format!("Ingredient '{}' not found", line.name));
        let line_ingredient = line.ingredient_id.ok_or_else(missing)?;
        let known: i64 = database::schema::ingredients::table
            .find(line_ingredient)
            .count()
            .get_result(conn)?;
        if known == 0 {
            return Err(missing());
        }

        diesel::insert_into(recipe_ingredients)
            .values(NewRecipeIngredient {
                recipe_id: for_recipe,
                ingredient_id: line_ingredient,
                amount: line.amount,
                unit: &line.unit,
            })
            .execute(conn)?;
    }
    Ok(())
}

#[cfg(test)]
fn line(id: impl Into<IngredientId>, name: &str, amount: Amount, unit: &str) -> IngredientLineInput {
    IngredientLineInput {
        id: Some(id.into()),
        name: Some(name.into()),
        amount: Some(amount),
        unit: Some(unit.into()),
    }
}

#[cfg(test)]
fn new_recipe(conn: &mut database::Connection) -> RecipeId {
    database::query::add_recipe(
        conn,
        database::models::NewRecipe {
            name: "Pancakes",
            source: "",
            steps: "Mix; Fry",
        },
    )
    .unwrap()
}

#[cfg(test)]
fn stored_lines(
    conn: &mut database::Connection,
    for_recipe: RecipeId,
) -> Vec<(IngredientId, f64, String)> {
    use database::schema::recipe_ingredients::dsl::*;

    recipe_ingredients
        .filter(recipe_id.eq(for_recipe))
        .order(id)
        .select((ingredient_id, amount, unit))
        .load(conn)
        .unwrap()
}

#[test]
fn resolve_lines_skips_incomplete_lines() {
    let lines = [
        line(1, "Flour", Amount::Text("2".into()), "cup"),
        line(2, "", Amount::Number(1.0), "cup"),
        line(3, "Salt", Amount::Text(" ".into()), "pinch"),
        line(4, "Water", Amount::Number(1.5), " "),
        line(5, "Yeast", Amount::Number(0.0), "tsp"),
        IngredientLineInput {
            id: Some(6.into()),
            name: Some("Milk".into()),
            ..Default::default()
        },
        line(7, " Egg ", Amount::Number(3.0), " whole "),
    ];

    let resolved = resolve_lines(&lines).unwrap();
    assert_eq!(
        resolved,
        [
            IngredientLine {
                ingredient_id: Some(1.into()),
                name: "Flour".into(),
                amount: 2.0,
                unit: "cup".into(),
            },
            IngredientLine {
                ingredient_id: Some(7.into()),
                name: "Egg".into(),
                amount: 3.0,
                unit: "whole".into(),
            },
        ]
    );
}

#[test]
fn resolve_lines_rejects_unparsable_amount() {
    let lines = [line(1, "Flour", Amount::Text("a handful".into()), "cup")];
    let error = resolve_lines(&lines).unwrap_err();
    assert!(matches!(error, StoreError::Validation(_)));
    assert_eq!(
        error.to_string(),
        "Amount 'a handful' of ingredient 'Flour' is not a number"
    );
}

#[test]
fn amounts_deserialize_from_numbers_and_strings() {
    let lines: Vec<IngredientLineInput> = serde_json::from_str(
        r#"[{"id": 5, "name": "Flour", "amount": "2", "unit": "cup"},
            {"id": 6, "name": "Milk", "amount": 0.5, "unit": "l"}]"#,
    )
    .unwrap();
    assert_eq!(lines[0].amount, Some(Amount::Text("2".into())));
    assert_eq!(lines[1].amount, Some(Amount::Number(0.5)));

    let unknown = serde_json::from_str::<IngredientLineInput>(r#"{"id": 5, "colour": "red"}"#);
    assert!(unknown.is_err());
}

#[test]
fn replace_types_skips_or_fails_on_unknown_ids() {
    use maplit::btreeset;

    let mut conn = database::in_memory();
    let recipe = new_recipe(&mut conn);
    let breakfast = database::query::add_recipe_type(&mut conn, "Breakfast").unwrap();
    let dessert = database::query::add_recipe_type(&mut conn, "Dessert").unwrap();

    let linked = replace_types(
        &mut conn,
        recipe,
        &[dessert.id, 99.into(), breakfast.id, dessert.id],
        UnknownTypePolicy::Skip,
    )
    .unwrap();
    assert_eq!(
        linked.into_iter().collect::<BTreeSet<_>>(),
        btreeset! {breakfast.id, dessert.id}
    );

    let error = replace_types(
        &mut conn,
        recipe,
        &[breakfast.id, 99.into()],
        UnknownTypePolicy::Fail,
    )
    .unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));

    let linked = replace_types(&mut conn, recipe, &[breakfast.id], UnknownTypePolicy::Fail)
        .unwrap();
    assert_eq!(linked, [breakfast.id]);

    use database::schema::recipe_type_associations::dsl::*;
    let stored: Vec<RecipeTypeId> = recipe_type_associations
        .filter(recipe_id.eq(recipe))
        .select(type_id)
        .load(&mut conn)
        .unwrap();
    assert_eq!(stored, [breakfast.id]);
}

#[test]
fn replace_ingredient_lines_replaces_previous_set() {
    let mut conn = database::in_memory();
    let recipe = new_recipe(&mut conn);
    let flour = database::query::add_ingredient(&mut conn, "Flour", None).unwrap();
    let milk = database::query::add_ingredient(&mut conn, "Milk", None).unwrap();

    let first = resolve_lines(&[line(flour.id, "Flour", Amount::Number(2.0), "cup")]);
    replace_ingredient_lines(&mut conn, recipe, &first.unwrap()).unwrap();

    let second = IngredientLine {
        ingredient_id: Some(milk.id),
        name: "Milk".into(),
        amount: 0.5,
        unit: "l".into(),
    };
    replace_ingredient_lines(&mut conn, recipe, &[second]).unwrap();

    assert_eq!(stored_lines(&mut conn, recipe), [(milk.id, 0.5, "l".to_owned())]);
}

#[test]
fn replace_ingredient_lines_rejects_unknown_ingredient() {
    let mut conn = database::in_memory();
    let recipe = new_recipe(&mut conn);

    for ingredient_id in [Some(42.into()), None] {
        let line = IngredientLine {
            ingredient_id,
            name: "Saffron".into(),
            amount: 1.0,
            unit: "pinch".into(),
        };
        let error = replace_ingredient_lines(&mut conn, recipe, &[line]).unwrap_err();
        assert_eq!(error.to_string(), "Ingredient 'Saffron' not found");
        assert!(matches!(error, StoreError::NotFound(_)));
    }
}
