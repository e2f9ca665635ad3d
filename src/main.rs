// Copyright 2023 Remi Bernotavicius

use clap::Parser;
use config::{Args, Commands, ServeArgs};
use database::associations::UnknownTypePolicy;
use std::path::Path;
use std::sync::Arc;

mod api;
mod config;
mod database;
mod error;
mod extract;
mod recipes;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;
type Result<T> = std::result::Result<T, Error>;

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for ctrl-c: {error}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}

async fn serve(database_path: &Path, args: ServeArgs) -> Result<()> {
    let pool = database::create_pool(database_path)?;

    let extractor = args.groq_api_key.as_ref().map(|key| {
        Arc::new(extract::GroqExtractor::new(&args.groq_base_url, key))
            as Arc<dyn extract::RecipeExtractor>
    });
    if extractor.is_none() {
        log::warn!("no Groq API key configured, image extraction is disabled");
    }
    if args.unknown_types == UnknownTypePolicy::Fail {
        log::info!("unknown recipe type ids will be rejected");
    }

    let state = Arc::new(api::AppContext {
        pool,
        recipes: recipes::RecipeService::new(args.unknown_types),
        default_category: args.default_category(),
        extractor,
    });
    let app = api::router(state, &args.cors_origin)?;

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    log::info!(
        "serving {} on http://{}",
        database_path.display(),
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    simple_logger::SimpleLogger::new()
        .with_level(args.log_level.into())
        .init()?;

    let database_path = args.database_path()?;
    match args.commands {
        Commands::Serve(serve_args) => serve(&database_path, serve_args).await?,
        Commands::AddType { name } => {
            let mut conn = database::establish_connection(&database_path)?;
            let recipe_type = database::query::add_recipe_type(&mut conn, &name)?;
            println!("{}\t{}", recipe_type.id, recipe_type.name);
        }
        Commands::AddCategory { name } => {
            let mut conn = database::establish_connection(&database_path)?;
            let category = database::query::add_ingredient_category(&mut conn, &name)?;
            println!("{}\t{}", category.id, category.name);
        }
    }
    Ok(())
}
