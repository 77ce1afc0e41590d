use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{Archive, NewArchive};

pub async fn insert_archive(archive: NewArchive, conn: &mut SqliteConnection) -> Result<Archive, sqlx::Error> {
    let archive = sqlx::query_as(
        "INSERT INTO archives (title, description, tag, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(archive.title)
    .bind(archive.description)
    .bind(archive.tag)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(archive)
}

/// Archives are ordered by id, which follows creation order.
pub async fn fetch_archives_paged(
    limit: i64,
    offset: i64,
    newest_first: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<Archive>, sqlx::Error> {
    let sql = if newest_first {
        "SELECT * FROM archives ORDER BY id DESC LIMIT $1 OFFSET $2"
    } else {
        "SELECT * FROM archives ORDER BY id ASC LIMIT $1 OFFSET $2"
    };
    let archives = sqlx::query_as(sql).bind(limit).bind(offset).fetch_all(conn).await?;
    Ok(archives)
}
