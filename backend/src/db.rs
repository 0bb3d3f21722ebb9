use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sqlite::SqliteConnection;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::features::{FeatureKind, FeatureSchema};
use crate::listing::ListingRecord;
use crate::models::{Host, Listing, NewHost, NewListing};
use crate::schema::{hosts, listings};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database {url}: {reason}")]
    Connection { url: String, reason: String },
    #[error("constraint violated: {0}")]
    Integrity(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i32 },
    #[error("database error: {0}")]
    Database(String),
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => {
                    StoreError::Integrity(info.message().to_string())
                }
                _ if info.message().contains("constraint failed") => {
                    StoreError::Integrity(info.message().to_string())
                }
                _ => StoreError::Database(info.message().to_string()),
            },
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Listing and host tables behind a single SQLite connection.
pub struct Store {
    conn: Mutex<SqliteConnection>,
    create_sql: String,
}

impl Store {
    /// Opens (or creates) the SQLite file at `database_url`. Use `:memory:`
    /// for a throwaway store.
    pub fn open(database_url: &str, schema: &FeatureSchema) -> Result<Self, StoreError> {
        log::info!("Opening database {}", database_url);
        let mut conn =
            SqliteConnection::establish(database_url).map_err(|e| StoreError::Connection {
                url: database_url.to_string(),
                reason: e.to_string(),
            })?;
        conn.batch_execute("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            create_sql: create_tables_sql(schema),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, SqliteConnection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    /// Creates any missing table; existing rows are kept.
    pub fn init(&self) -> Result<(), StoreError> {
        self.conn()?.batch_execute(&self.create_sql)?;
        Ok(())
    }

    /// Drops every table and recreates it empty.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            conn.batch_execute("DROP TABLE IF EXISTS listings; DROP TABLE IF EXISTS hosts;")?;
            conn.batch_execute(&self.create_sql)?;
            Ok(())
        })?;
        log::warn!("Dropped and recreated all tables");
        Ok(())
    }

    /// Inserts a listing and returns its id. Nothing is written on failure.
    pub fn save(&self, record: &ListingRecord, host_id: Option<i32>) -> Result<i32, StoreError> {
        let row = NewListing::from_record(record, host_id, chrono::Utc::now().timestamp())?;
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| Ok(insert_listing(conn, &row)?))
    }

    /// Saves a listing owned by the host named `host_name`, creating the host
    /// on first use. Either every row is written or none is.
    pub fn save_with_host(&self, record: &ListingRecord, host_name: &str) -> Result<i32, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut conn = self.conn()?;
        conn.transaction::<_, StoreError, _>(|conn| {
            let existing = hosts::table
                .filter(hosts::name.eq(host_name))
                .select(hosts::id)
                .order(hosts::id.asc())
                .first::<i32>(conn)
                .optional()?;
            let host_id = match existing {
                Some(id) => id,
                None => insert_host(conn, host_name, now)?,
            };
            let row = NewListing::from_record(record, Some(host_id), now)?;
            Ok(insert_listing(conn, &row)?)
        })
    }

    pub fn get(&self, id: i32) -> Result<ListingRecord, StoreError> {
        let mut conn = self.conn()?;
        listings::table
            .find(id)
            .select(Listing::as_select())
            .first(&mut *conn)
            .optional()?
            .map(Listing::into_record)
            .ok_or(StoreError::NotFound {
                entity: "listing",
                id,
            })
    }

    /// Ids of every listing owned by a host, oldest first.
    pub fn listings_for_host(&self, host_id: i32) -> Result<Vec<i32>, StoreError> {
        let mut conn = self.conn()?;
        let host = hosts::table
            .find(host_id)
            .select(Host::as_select())
            .first(&mut *conn)
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "host",
                id: host_id,
            })?;
        Ok(Listing::belonging_to(&host)
            .select(listings::id)
            .order(listings::id.asc())
            .load(&mut *conn)?)
    }

    pub fn count_listings(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        Ok(listings::table.count().get_result(&mut *conn)?)
    }
}

fn insert_listing(conn: &mut SqliteConnection, row: &NewListing) -> Result<i32, DieselError> {
    diesel::insert_into(listings::table).values(row).execute(conn)?;
    last_insert_id(conn)
}

fn insert_host(conn: &mut SqliteConnection, name: &str, created_at: i64) -> Result<i32, DieselError> {
    diesel::insert_into(hosts::table)
        .values(&NewHost { name, created_at })
        .execute(conn)?;
    last_insert_id(conn)
}

fn last_insert_id(conn: &mut SqliteConnection) -> Result<i32, DieselError> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("last_insert_rowid()"))
        .get_result(conn)
}

/// DDL for both tables. Listing columns and their CHECK constraints follow
/// the feature domains, so the database rejects what the form would.
pub fn create_tables_sql(schema: &FeatureSchema) -> String {
    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS hosts (\n    \
         id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n    \
         name TEXT NOT NULL CHECK (length(name) > 0),\n    \
         created_at BIGINT NOT NULL\n);\n\
         CREATE TABLE IF NOT EXISTS listings (\n    \
         id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,\n    \
         host_id INTEGER REFERENCES hosts(id),\n",
    );
    for column in schema.canonical_order() {
        let Some(spec) = schema.get(column) else {
            continue;
        };
        let definition = match &spec.kind {
            FeatureKind::Choice { options } => {
                let allowed: Vec<String> = options.iter().map(|o| sql_literal(o)).collect();
                format!("TEXT NOT NULL CHECK ({} IN ({}))", column, allowed.join(", "))
            }
            FeatureKind::Number { min, max, .. } => {
                format!("DOUBLE NOT NULL CHECK ({} BETWEEN {} AND {})", column, min, max)
            }
            FeatureKind::Boolean => format!("BOOLEAN NOT NULL CHECK ({} IN (0, 1))", column),
        };
        sql.push_str(&format!("    {} {},\n", column, definition));
    }
    sql.push_str("    created_at BIGINT NOT NULL\n);\n");
    sql
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
