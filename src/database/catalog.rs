//! Catalog queries against `information_schema`, shared by the materializer
//! and the quality checker. Table names are bound as parameters; only
//! allow-listed [`DestinationTable`]s are accepted.

use sqlx::PgPool;

use crate::constants::DestinationTable;

/// Whether `table` exists in the connection's current schema
pub async fn table_exists(pool: &PgPool, table: DestinationTable) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )
        "#,
    )
    .bind(table.name())
    .fetch_one(pool)
    .await
}

/// `(column_name, data_type)` pairs of `table`, in ordinal order
pub async fn table_columns(
    pool: &PgPool,
    table: DestinationTable,
) -> Result<Vec<(String, String)>, sqlx::Error> {
    sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT column_name::text, data_type::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table.name())
    .fetch_all(pool)
    .await
}
