// Copyright 2023 Remi Bernotavicius

use crate::database::associations::UnknownTypePolicy;
use crate::database::models::IngredientCategoryId;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Recipe storage and HTTP API")]
pub struct Args {
    /// SQLite database file. Defaults to `data.sqlite` in the user data directory.
    #[arg(long, global = true, env = "RECIPES_DATABASE")]
    pub database: Option<PathBuf>,

    #[arg(long, global = true, env = "RECIPES_LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub commands: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP API.
    Serve(ServeArgs),
    /// Add a recipe type.
    AddType { name: String },
    /// Add an ingredient category.
    AddCategory { name: String },
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "RECIPES_BIND", default_value = "127.0.0.1:5000")]
    pub bind: SocketAddr,

    /// Origin allowed to make cross-origin requests.
    #[arg(long, env = "RECIPES_CORS_ORIGIN", default_value = "http://localhost:5173")]
    pub cors_origin: String,

    /// What to do when a recipe names a type id that doesn't exist.
    #[arg(long, env = "RECIPES_UNKNOWN_TYPES", value_enum, default_value_t)]
    pub unknown_types: UnknownTypePolicy,

    /// Category given to ingredients added without one.
    #[arg(long, env = "RECIPES_DEFAULT_INGREDIENT_CATEGORY", default_value = "1")]
    pub default_ingredient_category: i32,

    /// Enables `/api/recipes/process-image`.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "GROQ_BASE_URL", default_value = crate::extract::GROQ_BASE_URL)]
    pub groq_base_url: String,
}

impl ServeArgs {
    pub fn default_category(&self) -> IngredientCategoryId {
        self.default_ingredient_category.into()
    }
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

/// This is where the database lives on-disk unless overridden. On Linux it should be like:
/// `~/.local/share/recipe_backend/`
pub fn data_path() -> crate::Result<PathBuf> {
    let dirs = directories::BaseDirs::new().ok_or("failed to get user home directory")?;
    let path = dirs.data_dir().join("recipe_backend");
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

impl Args {
    pub fn database_path(&self) -> crate::Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(data_path()?.join("data.sqlite")),
        }
    }
}

#[test]
fn serve_defaults() {
    let args = Args::try_parse_from(["recipe-backend", "serve"]).unwrap();
    assert_eq!(args.log_level, LogLevel::Info);
    let Commands::Serve(serve) = args.commands else {
        panic!("expected serve");
    };
    assert_eq!(serve.bind, "127.0.0.1:5000".parse().unwrap());
    assert_eq!(serve.unknown_types, UnknownTypePolicy::Skip);
    assert_eq!(serve.default_category(), IngredientCategoryId::UNCATEGORIZED);
}

#[test]
fn global_flags_follow_subcommand() {
    let args = Args::try_parse_from([
        "recipe-backend",
        "add-type",
        "Dessert",
        "--database",
        "/tmp/recipes.sqlite",
        "--log-level",
        "debug",
    ])
    .unwrap();
    assert_eq!(args.database_path().unwrap(), PathBuf::from("/tmp/recipes.sqlite"));
    assert_eq!(log::LevelFilter::from(args.log_level), log::LevelFilter::Debug);
    assert!(matches!(args.commands, Commands::AddType { name } if name == "Dessert"));
}

#[test]
fn unknown_type_policy_parses() {
    let args = Args::try_parse_from(["recipe-backend", "serve", "--unknown-types", "fail"]).unwrap();
    let Commands::Serve(serve) = args.commands else {
        panic!("expected serve");
    };
    assert_eq!(serve.unknown_types, UnknownTypePolicy::Fail);
}
