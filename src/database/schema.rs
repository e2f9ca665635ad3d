// Copyright 2023 Remi Bernotavicius

diesel::table! {
    ingredient_categories (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    ingredients (id) {
        id -> Integer,
        name -> Text,
        category_id -> Nullable<Integer>,
    }
}

diesel::table! {
    recipe_ingredients (id) {
        id -> Integer,
        recipe_id -> Integer,
        ingredient_id -> Integer,
        amount -> Double,
        unit -> Text,
    }
}

diesel::table! {
    recipe_type_associations (recipe_id, type_id) {
        recipe_id -> Integer,
        type_id -> Integer,
    }
}

diesel::table! {
    recipe_types (id) {
        id -> Integer,
        name -> Text,
    }
}

diesel::table! {
    recipes (id) {
        id -> Integer,
        name -> Text,
        source -> Text,
        steps -> Text,
    }
}

diesel::joinable!(ingredients -> ingredient_categories (category_id));
diesel::joinable!(recipe_ingredients -> ingredients (ingredient_id));
diesel::joinable!(recipe_ingredients -> recipes (recipe_id));
diesel::joinable!(recipe_type_associations -> recipe_types (type_id));
diesel::joinable!(recipe_type_associations -> recipes (recipe_id));

diesel::allow_tables_to_appear_in_same_query!(
    ingredient_categories,
    ingredients,
    recipe_ingredients,
    recipe_type_associations,
    recipe_types,
    recipes,
);
