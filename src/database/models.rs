// Copyright 2023 Remi Bernotavicius

use derive_more::{Display, From};
use diesel::associations::{Associations, Identifiable};
use diesel::deserialize::Queryable;
use diesel::expression::Selectable;
use diesel::prelude::Insertable;
use diesel_derive_newtype::DieselNewType;
use serde::{Deserialize, Serialize};

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct IngredientCategoryId(i32);

impl IngredientCategoryId {
    /// Seeded by the initial migration.
    pub const UNCATEGORIZED: Self = Self(1);
}

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::ingredient_categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngredientCategory {
    pub id: IngredientCategoryId,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredient_categories)]
pub struct NewIngredientCategory<'a> {
    pub name: &'a str,
}

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct IngredientId(i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub category_id: Option<IngredientCategoryId>,
}

/// The `{id, name}` projection of an ingredient used by list views.
#[derive(Queryable, Selectable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IngredientHandle {
    pub id: IngredientId,
    pub name: String,
}

impl From<Ingredient> for IngredientHandle {
    fn from(ingredient: Ingredient) -> Self {
        Self {
            id: ingredient.id,
            name: ingredient.name,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::ingredients)]
pub struct NewIngredient<'a> {
    pub name: &'a str,
    pub category_id: Option<IngredientCategoryId>,
}

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RecipeTypeId(i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq, Serialize)]
#[diesel(table_name = crate::database::schema::recipe_types)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecipeType {
    pub id: RecipeTypeId,
    pub name: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_types)]
pub struct NewRecipeType<'a> {
    pub name: &'a str,
}

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RecipeId(i32);

#[derive(Queryable, Selectable, Identifiable, Clone, Debug, PartialEq)]
#[diesel(table_name = crate::database::schema::recipes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub source: String,
    pub steps: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub steps: &'a str,
}

#[derive(
    DieselNewType,
    Debug,
    Display,
    From,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct RecipeIngredientId(i32);

#[derive(Associations, Queryable, Selectable, Identifiable, Clone, Debug, PartialEq)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(Ingredient))]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecipeIngredient {
    pub id: RecipeIngredientId,
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: f64,
    pub unit: String,
}

#[derive(Insertable)]
#[diesel(table_name = crate::database::schema::recipe_ingredients)]
pub struct NewRecipeIngredient<'a> {
    pub recipe_id: RecipeId,
    pub ingredient_id: IngredientId,
    pub amount: f64,
    pub unit: &'a str,
}

#[derive(Associations, Queryable, Selectable, Identifiable, Insertable, Clone, Debug, PartialEq)]
#[diesel(belongs_to(Recipe))]
#[diesel(belongs_to(RecipeType, foreign_key = type_id))]
#[diesel(primary_key(recipe_id, type_id))]
#[diesel(table_name = crate::database::schema::recipe_type_associations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecipeTypeAssociation {
    pub recipe_id: RecipeId,
    pub type_id: RecipeTypeId,
}
