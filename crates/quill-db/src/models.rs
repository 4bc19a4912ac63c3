//! Database row types. These map directly to SQLite rows and stay distinct
//! from the quill-types wire models; timestamps are kept as stored text.

use quill_types::models::Role;
use rusqlite::Row;
use rusqlite::types::Type;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    pub created_at: String,
}

/// A post joined with its author's public columns.
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub published_date: String,
    pub author_id: i64,
    pub author_name: String,
    pub author_role: Role,
    pub comment_count: u64,
}

/// A comment joined with its author's public columns.
pub struct CommentRow {
    pub id: i64,
    pub content: String,
    pub created_at: String,
    pub post_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub user_role: Role,
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub image: Option<&'a str>,
    pub author_id: i64,
}

/// Partial post update; `None` leaves the column as is.
#[derive(Default)]
pub struct PostChanges<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
    pub image: Option<&'a str>,
}

pub(crate) fn role_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) const USER_COLUMNS: &str = "id, email, password, name, role, created_at";

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        name: row.get(3)?,
        role: role_at(row, 4)?,
        created_at: row.get(5)?,
    })
}

pub(crate) const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.image, p.published_date,
        p.author_id, u.name, u.role,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)
     FROM posts p
     JOIN users u ON u.id = p.author_id";

pub(crate) fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        image: row.get(3)?,
        published_date: row.get(4)?,
        author_id: row.get(5)?,
        author_name: row.get(6)?,
        author_role: role_at(row, 7)?,
        comment_count: row.get::<_, i64>(8)?.max(0) as u64,
    })
}

pub(crate) const COMMENT_SELECT: &str = "SELECT c.id, c.content, c.created_at, c.post_id,
        c.user_id, u.name, u.role
     FROM comments c
     JOIN users u ON u.id = c.user_id";

pub(crate) fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        content: row.get(1)?,
        created_at: row.get(2)?,
        post_id: row.get(3)?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        user_role: role_at(row, 6)?,
    })
}
