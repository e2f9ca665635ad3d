// Copyright 2023 Remi Bernotavicius

use crate::database::models::{
    Ingredient, IngredientCategory, IngredientCategoryId, IngredientId, NewIngredient,
    NewIngredientCategory, NewRecipe, NewRecipeType, Recipe, RecipeId, RecipeType, RecipeTypeId,
};
use crate::database::{self, unit_of_work};
use crate::error::{require_text, StoreError};
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

diesel::define_sql_function! {
    fn last_insert_rowid() -> diesel::sql_types::Integer;
}

fn inserted_id<T: From<i32>>(conn: &mut database::Connection) -> Result<T, StoreError> {
    let id: i32 = diesel::select(last_insert_rowid()).get_result(conn)?;
    Ok(id.into())
}

pub fn list_ingredient_categories(
    conn: &mut database::Connection,
) -> Result<Vec<IngredientCategory>, StoreError> {
    use database::schema::ingredient_categories::dsl::*;

    Ok(ingredient_categories
        .select(IngredientCategory::as_select())
        .order(id)
        .load(conn)?)
}

pub fn get_ingredient_category(
    conn: &mut database::Connection,
    category_id: IngredientCategoryId,
) -> Result<IngredientCategory, StoreError> {
    use database::schema::ingredient_categories::dsl::*;

    ingredient_categories
        .find(category_id)
        .select(IngredientCategory::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("Ingredient category {category_id}")))
}

pub fn add_ingredient_category(
    conn: &mut database::Connection,
    new_name: &str,
) -> Result<IngredientCategory, StoreError> {
    use database::schema::ingredient_categories::dsl::*;

    let new_name = require_text(new_name, "Category name")?;
    unit_of_work(conn, |conn| {
        diesel::insert_into(ingredient_categories)
            .values(NewIngredientCategory { name: &new_name })
            .execute(conn)
            .map_err(|e| {
                StoreError::from(e)
                    .with_conflict_message(format!("Ingredient category '{new_name}' already exists"))
            })?;
        Ok(IngredientCategory {
            id: inserted_id(conn)?,
            name: new_name.clone(),
        })
    })
}

pub fn list_ingredients(conn: &mut database::Connection) -> Result<Vec<Ingredient>, StoreError> {
    use database::schema::ingredients::dsl::*;

    Ok(ingredients
        .select(Ingredient::as_select())
        .order(id)
        .load(conn)?)
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Ingredient, StoreError> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("Ingredient {ingredient_id}")))
}

pub fn add_ingredient(
    conn: &mut database::Connection,
    new_name: &str,
    new_category: Option<IngredientCategoryId>,
) -> Result<Ingredient, StoreError> {
    use database::schema::ingredients::dsl::*;

    let new_name = require_text(new_name, "Ingredient name")?;
    unit_of_work(conn, |conn| {
        if let Some(new_category) = new_category {
            get_ingredient_category(conn, new_category)?;
        }
        diesel::insert_into(ingredients)
            .values(NewIngredient {
                name: &new_name,
                category_id: new_category,
            })
            .execute(conn)?;
        Ok(Ingredient {
            id: inserted_id(conn)?,
            name: new_name.clone(),
            category_id: new_category,
        })
    })
}

/// Overwrites every scalar column of the ingredient.
pub fn update_ingredient(
    conn: &mut database::Connection,
    edit: &Ingredient,
) -> Result<(), StoreError> {
    use database::schema::ingredients::dsl::*;

    let edit_name = require_text(&edit.name, "Ingredient name")?;
    unit_of_work(conn, |conn| {
        if let Some(edit_category) = edit.category_id {
            get_ingredient_category(conn, edit_category)?;
        }
        let updated = diesel::update(ingredients.find(edit.id))
            .set((name.eq(&edit_name), category_id.eq(edit.category_id)))
            .execute(conn)?;
        if updated == 0 {
            return Err(StoreError::not_found(format!("Ingredient {}", edit.id)));
        }
        Ok(())
    })
}

/// Deletes the ingredient together with every recipe line that uses it. The recipes stay.
pub fn delete_ingredient(
    conn: &mut database::Connection,
    delete_id: IngredientId,
) -> Result<(), StoreError> {
    unit_of_work(conn, |conn| {
        {
            use database::schema::recipe_ingredients::dsl::*;

            let removed = diesel::delete(recipe_ingredients.filter(ingredient_id.eq(delete_id)))
                .execute(conn)?;
            log::debug!("removed {removed} recipe lines using ingredient {delete_id}");
        }

        use database::schema::ingredients::dsl::*;

        let deleted = diesel::delete(ingredients.find(delete_id)).execute(conn)?;
        if deleted == 0 {
            return Err(StoreError::not_found(format!("Ingredient {delete_id}")));
        }
        Ok(())
    })
}

pub fn list_recipe_types(conn: &mut database::Connection) -> Result<Vec<RecipeType>, StoreError> {
    use database::schema::recipe_types::dsl::*;

    Ok(recipe_types
        .select(RecipeType::as_select())
        .order(id)
        .load(conn)?)
}

pub fn get_recipe_type(
    conn: &mut database::Connection,
    type_id: RecipeTypeId,
) -> Result<RecipeType, StoreError> {
    use database::schema::recipe_types::dsl::*;

    recipe_types
        .find(type_id)
        .select(RecipeType::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("Recipe type {type_id}")))
}

pub fn add_recipe_type(
    conn: &mut database::Connection,
    new_name: &str,
) -> Result<RecipeType, StoreError> {
    use database::schema::recipe_types::dsl::*;

    let new_name = require_text(new_name, "Recipe type name")?;
    unit_of_work(conn, |conn| {
        diesel::insert_into(recipe_types)
            .values(NewRecipeType { name: &new_name })
            .execute(conn)
            .map_err(|e| {
                StoreError::from(e)
                    .with_conflict_message(format!("Recipe type '{new_name}' already exists"))
            })?;
        Ok(RecipeType {
            id: inserted_id(conn)?,
            name: new_name.clone(),
        })
    })
}

/// Deletes the type and its recipe associations. Recipes themselves are kept.
pub fn delete_recipe_type(
    conn: &mut database::Connection,
    delete_id: RecipeTypeId,
) -> Result<(), StoreError> {
    unit_of_work(conn, |conn| {
        {
            use database::schema::recipe_type_associations::dsl::*;

            diesel::delete(recipe_type_associations.filter(type_id.eq(delete_id)))
                .execute(conn)?;
        }

        use database::schema::recipe_types::dsl::*;

        let deleted = diesel::delete(recipe_types.find(delete_id)).execute(conn)?;
        if deleted == 0 {
            return Err(StoreError::not_found(format!("Recipe type {delete_id}")));
        }
        Ok(())
    })
}

pub fn list_recipes(conn: &mut database::Connection) -> Result<Vec<Recipe>, StoreError> {
    use database::schema::recipes::dsl::*;

    Ok(recipes.select(Recipe::as_select()).order(id).load(conn)?)
}

pub fn get_recipe(
    conn: &mut database::Connection,
    recipe_id: RecipeId,
) -> Result<Recipe, StoreError> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("Recipe {recipe_id}")))
}

pub fn add_recipe(
    conn: &mut database::Connection,
    new_recipe: NewRecipe<'_>,
) -> Result<RecipeId, StoreError> {
    use database::schema::recipes::dsl::*;

    diesel::insert_into(recipes)
        .values(new_recipe)
        .execute(conn)?;
    inserted_id(conn)
}

/// Overwrites every scalar column of the recipe. Its lines and types are left alone.
pub fn update_recipe(conn: &mut database::Connection, edit: &Recipe) -> Result<(), StoreError> {
    use database::schema::recipes::dsl::*;

    let updated = diesel::update(recipes.find(edit.id))
        .set((
            name.eq(&edit.name),
            source.eq(&edit.source),
            steps.eq(&edit.steps),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(StoreError::not_found(format!("Recipe {}", edit.id)));
    }
    Ok(())
}

/// Deletes the recipe with its ingredient lines and type associations. The referenced
/// ingredients and types are kept.
pub fn delete_recipe(
    conn: &mut database::Connection,
    delete_id: RecipeId,
) -> Result<(), StoreError> {
    unit_of_work(conn, |conn| {
        {
            use database::schema::recipe_ingredients::dsl::*;

            diesel::delete(recipe_ingredients.filter(recipe_id.eq(delete_id))).execute(conn)?;
        }
        {
            use database::schema::recipe_type_associations::dsl::*;

            diesel::delete(recipe_type_associations.filter(recipe_id.eq(delete_id)))
                .execute(conn)?;
        }

        use database::schema::recipes::dsl::*;

        let deleted = diesel::delete(recipes.find(delete_id)).execute(conn)?;
        if deleted == 0 {
            return Err(StoreError::not_found(format!("Recipe {delete_id}")));
        }
        Ok(())
    })
}

#[cfg(test)]
fn count_lines_for_recipe(conn: &mut database::Connection, for_recipe: RecipeId) -> i64 {
    use database::schema::recipe_ingredients::dsl::*;

    recipe_ingredients
        .filter(recipe_id.eq(for_recipe))
        .count()
        .get_result(conn)
        .unwrap()
}

#[cfg(test)]
fn insert_line(
    conn: &mut database::Connection,
    for_recipe: RecipeId,
    for_ingredient: IngredientId,
) {
    diesel::insert_into(database::schema::recipe_ingredients::table)
        .values(crate::database::models::NewRecipeIngredient {
            recipe_id: for_recipe,
            ingredient_id: for_ingredient,
            amount: 1.0,
            unit: "cup",
        })
        .execute(conn)
        .unwrap();
}

#[test]
fn ingredients_default_to_no_category() {
    let mut conn = database::in_memory();

    let flour = add_ingredient(&mut conn, " Flour ", None).unwrap();
    assert_eq!(flour.name, "Flour");
    assert_eq!(flour.category_id, None);

    let sugar = add_ingredient(&mut conn, "Sugar", Some(IngredientCategoryId::UNCATEGORIZED)).unwrap();
    assert_eq!(get_ingredient(&mut conn, sugar.id).unwrap(), sugar);

    let names: Vec<_> = list_ingredients(&mut conn)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, ["Flour", "Sugar"]);
}

#[test]
fn ingredient_with_unknown_category_is_rejected() {
    let mut conn = database::in_memory();

    let error = add_ingredient(&mut conn, "Flour", Some(99.into())).unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));
    assert!(list_ingredients(&mut conn).unwrap().is_empty());

    let error = add_ingredient(&mut conn, "  ", None).unwrap_err();
    assert!(matches!(error, StoreError::Validation(_)));
}

#[test]
fn update_ingredient_overwrites_row() {
    let mut conn = database::in_memory();

    let baking = add_ingredient_category(&mut conn, "Baking").unwrap();
    let mut flour = add_ingredient(&mut conn, "flour", None).unwrap();
    flour.name = "Flour".into();
    flour.category_id = Some(baking.id);
    update_ingredient(&mut conn, &flour).unwrap();
    assert_eq!(get_ingredient(&mut conn, flour.id).unwrap(), flour);

    flour.id = 77.into();
    let error = update_ingredient(&mut conn, &flour).unwrap_err();
    assert!(matches!(error, StoreError::NotFound(_)));
}

#[test]
fn category_and_type_names_are_unique() {
    let mut conn = database::in_memory();

    let error = add_ingredient_category(&mut conn, "Uncategorized").unwrap_err();
    assert!(matches!(error, StoreError::Conflict(_)));

    add_recipe_type(&mut conn, "Dessert").unwrap();
    let error = add_recipe_type(&mut conn, "Dessert").unwrap_err();
    assert!(matches!(&error, StoreError::Conflict(m) if m == "Recipe type 'Dessert' already exists"));
    assert_eq!(list_recipe_types(&mut conn).unwrap().len(), 1);

    let categories = list_ingredient_categories(&mut conn).unwrap();
    assert_eq!(categories[0].id, IngredientCategoryId::UNCATEGORIZED);
}

#[test]
fn deleting_ingredient_removes_its_lines_only() {
    let mut conn = database::in_memory();

    let flour = add_ingredient(&mut conn, "Flour", None).unwrap();
    let egg = add_ingredient(&mut conn, "Egg", None).unwrap();
    let recipe = add_recipe(
        &mut conn,
        NewRecipe {
            name: "Pancakes",
            source: "",
            steps: "Mix; Fry",
        },
    )
    .unwrap();
    insert_line(&mut conn, recipe, flour.id);
    insert_line(&mut conn, recipe, egg.id);

    delete_ingredient(&mut conn, flour.id).unwrap();

    assert_eq!(count_lines_for_recipe(&mut conn, recipe), 1);
    assert_eq!(get_recipe(&mut conn, recipe).unwrap().name, "Pancakes");
    assert!(matches!(
        get_ingredient(&mut conn, flour.id),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        delete_ingredient(&mut conn, flour.id),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn deleting_recipe_keeps_ingredients_and_types() {
    use crate::database::models::RecipeTypeAssociation;

    let mut conn = database::in_memory();

    let flour = add_ingredient(&mut conn, "Flour", None).unwrap();
    let breakfast = add_recipe_type(&mut conn, "Breakfast").unwrap();
    let recipe = add_recipe(
        &mut conn,
        NewRecipe {
            name: "Pancakes",
            source: "",
            steps: "Mix; Fry",
        },
    )
    .unwrap();
    insert_line(&mut conn, recipe, flour.id);
    diesel::insert_into(database::schema::recipe_type_associations::table)
        .values(RecipeTypeAssociation {
            recipe_id: recipe,
            type_id: breakfast.id,
        })
        .execute(&mut conn)
        .unwrap();

    delete_recipe(&mut conn, recipe).unwrap();

    assert_eq!(count_lines_for_recipe(&mut conn, recipe), 0);
    let links: i64 = database::schema::recipe_type_associations::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(links, 0);
    assert_eq!(get_ingredient(&mut conn, flour.id).unwrap(), flour);
    assert_eq!(get_recipe_type(&mut conn, breakfast.id).unwrap(), breakfast);
    assert!(matches!(
        delete_recipe(&mut conn, recipe),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn deleting_type_keeps_recipes() {
    use crate::database::models::RecipeTypeAssociation;

    let mut conn = database::in_memory();

    let soup = add_recipe_type(&mut conn, "Soup").unwrap();
    let recipe = add_recipe(
        &mut conn,
        NewRecipe {
            name: "Minestrone",
            source: "",
            steps: "Simmer",
        },
    )
    .unwrap();
    diesel::insert_into(database::schema::recipe_type_associations::table)
        .values(RecipeTypeAssociation {
            recipe_id: recipe,
            type_id: soup.id,
        })
        .execute(&mut conn)
        .unwrap();

    delete_recipe_type(&mut conn, soup.id).unwrap();

    assert!(list_recipe_types(&mut conn).unwrap().is_empty());
    assert_eq!(list_recipes(&mut conn).unwrap().len(), 1);
}

#[test]
fn update_recipe_overwrites_scalars() {
    let mut conn = database::in_memory();

    let id = add_recipe(
        &mut conn,
        NewRecipe {
            name: "Pancakes",
            source: "grandma",
            steps: "Mix",
        },
    )
    .unwrap();
    let edit = Recipe {
        id,
        name: "Crepes".into(),
        source: String::new(),
        steps: "Mix; Fry thin".into(),
    };
    update_recipe(&mut conn, &edit).unwrap();
    assert_eq!(get_recipe(&mut conn, id).unwrap(), edit);

    let missing = Recipe {
        id: 1234.into(),
        ..edit
    };
    assert!(matches!(
        update_recipe(&mut conn, &missing),
        Err(StoreError::NotFound(_))
    ));
}
