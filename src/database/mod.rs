// Copyright 2023 Remi Bernotavicius

use crate::error::StoreError;
use diesel::connection::SimpleConnection as _;
use diesel::connection::{AnsiTransactionManager, TransactionManager as _};
use diesel::prelude::Connection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::error::Error;
use std::path::Path;

pub mod associations;
pub mod models;
pub mod query;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;
pub type Pool = diesel::r2d2::Pool<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// SQLite leaves foreign keys off unless asked, per connection.
fn configure(conn: &mut Connection) -> diesel::QueryResult<()> {
    conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
}

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<Connection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), diesel::r2d2::Error> {
        configure(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn establish_connection(
    path: impl AsRef<Path>,
) -> Result<Connection, Box<dyn Error + Send + Sync + 'static>> {
    let mut connection = Connection::establish(&path.as_ref().to_string_lossy())?;
    configure(&mut connection)?;
    connection.run_pending_migrations(MIGRATIONS)?;
    Ok(connection)
}

pub fn create_pool(path: impl AsRef<Path>) -> Result<Pool, Box<dyn Error + Send + Sync + 'static>> {
    let manager = ConnectionManager::<Connection>::new(path.as_ref().to_string_lossy());
    let pool = diesel::r2d2::Pool::builder()
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)?;

    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)?;
    for migration in applied {
        log::info!("applied migration {migration}");
    }
    Ok(pool)
}

/// Runs `work` inside one write transaction. It commits only when `work` returns `Ok`; an error
/// or a panic rolls back every row written through the connection it is handed.
///
/// The outermost call takes SQLite's write lock up front (`BEGIN IMMEDIATE`) so a competing
/// writer waits out `busy_timeout` instead of failing on lock upgrade. Nested calls become
/// savepoints.
pub fn unit_of_work<T, F>(conn: &mut Connection, work: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut Connection) -> Result<T, StoreError>,
{
    let nested = AnsiTransactionManager::transaction_manager_status_mut(conn)
        .transaction_depth()?
        .is_some();
    let result = if nested {
        conn.transaction(work)
    } else {
        conn.immediate_transaction(work)
    };
    result.inspect_err(|error| match error {
        StoreError::Validation(_) | StoreError::NotFound(_) | StoreError::Conflict(_) => {
            log::debug!("rolled back transaction: {error}")
        }
        _ => log::warn!("rolled back transaction: {error}"),
    })
}

/// Runs read-only `work` against one consistent snapshot.
pub fn snapshot<T, F>(conn: &mut Connection, work: F) -> Result<T, StoreError>
where
    F: FnOnce(&mut Connection) -> Result<T, StoreError>,
{
    conn.transaction(work)
}

#[cfg(test)]
pub fn in_memory() -> Connection {
    establish_connection(":memory:").unwrap()
}

#[test]
fn migrations() {
    let mut conn = Connection::establish(":memory:").unwrap();
    for _ in 0..2 {
        conn.run_pending_migrations(MIGRATIONS).unwrap();
        assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
        conn.revert_all_migrations(MIGRATIONS).unwrap();
        assert!(conn.has_pending_migration(MIGRATIONS).unwrap());
    }
}

#[test]
fn foreign_keys_are_enforced() {
    use diesel::RunQueryDsl as _;

    let mut conn = in_memory();
    let result = diesel::insert_into(schema::recipe_ingredients::table)
        .values(models::NewRecipeIngredient {
            recipe_id: 41.into(),
            ingredient_id: 42.into(),
            amount: 1.0,
            unit: "cup",
        })
        .execute(&mut conn);
    assert!(result.is_err());
}

#[test]
fn unit_of_work_rolls_back_on_error() {
    use diesel::{QueryDsl as _, RunQueryDsl as _};

    let mut conn = in_memory();
    let result: Result<(), StoreError> = unit_of_work(&mut conn, |tx| {
        query::add_recipe_type(tx, "Breakfast")?;
        Err(StoreError::Validation("nope".into()))
    });
    assert!(result.is_err());

    let count: i64 = schema::recipe_types::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn pool_applies_migrations_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.sqlite");

    let pool = create_pool(&path).unwrap();
    let mut conn = pool.get().unwrap();
    assert!(!conn.has_pending_migration(MIGRATIONS).unwrap());
    drop(conn);
    drop(pool);

    create_pool(&path).unwrap();
}

#[test]
fn nested_unit_of_work_rolls_back_to_savepoint() {
    let mut conn = in_memory();
    unit_of_work(&mut conn, |conn| {
        query::add_recipe_type(conn, "Breakfast")?;
        let inner: Result<(), StoreError> = unit_of_work(conn, |conn| {
            query::add_recipe_type(conn, "Dessert")?;
            Err(StoreError::Validation("nope".into()))
        });
        assert!(inner.is_err());
        Ok(())
    })
    .unwrap();

    let names: Vec<_> = query::list_recipe_types(&mut conn)
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, ["Breakfast"]);
}

#[test]
fn concurrent_writers_wait_for_each_other() {
    use std::sync::mpsc;
    use std::time::Duration;

    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(dir.path().join("data.sqlite")).unwrap();

    let (holding, wait_for_holder) = mpsc::channel();
    let mut first = pool.get().unwrap();
    let holder = std::thread::spawn(move || {
        unit_of_work(&mut first, |conn| {
            query::add_recipe_type(conn, "Breakfast")?;
            holding.send(()).unwrap();
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .unwrap();
    });
    wait_for_holder.recv().unwrap();

    let mut second = pool.get().unwrap();
    let added = unit_of_work(&mut second, |conn| {
        query::list_recipe_types(conn)?;
        query::add_recipe_type(conn, "Dessert")
    });
    holder.join().unwrap();

    assert!(added.is_ok(), "{added:?}");
    assert_eq!(query::list_recipe_types(&mut second).unwrap().len(), 2);
}
