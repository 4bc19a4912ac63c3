use crate::Database;
use crate::models::{
    COMMENT_SELECT, CommentRow, NewPost, POST_SELECT, PostChanges, PostRow, USER_COLUMNS, UserRow,
    comment_from_row, post_from_row, user_from_row,
};
use anyhow::Result;
use quill_types::models::Role;
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    // -- Users --

    /// Inserts a user unless the email is taken. Returns `None` on a duplicate
    /// email; the uniqueness check and the insert are a single statement.
    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (email, password, name, role) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(email) DO NOTHING",
                params![email, password_hash, name, role.as_str()],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], user_from_row).optional()?)
        })
    }

    // -- Posts --

    pub fn create_post(&self, post: &NewPost<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (title, content, image, author_id) VALUES (?1, ?2, ?3, ?4)",
                params![post.title, post.content, post.image, post.author_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1");
            Ok(conn.query_row(&sql, [id], post_from_row).optional()?)
        })
    }

    /// Returns false when no post has this id.
    pub fn update_post(&self, id: i64, changes: &PostChanges<'_>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE posts SET
                    title = COALESCE(?2, title),
                    content = COALESCE(?3, content),
                    image = COALESCE(?4, image)
                 WHERE id = ?1",
                params![id, changes.title, changes.content, changes.image],
            )?;
            Ok(updated > 0)
        })
    }

    /// Deletes a post and, through the foreign key, its comments.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? > 0))
    }

    /// One page of posts, newest first, plus the number of posts matching
    /// `search` in either the title or the author's name.
    pub fn list_posts(
        &self,
        search: Option<&str>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<PostRow>, u64)> {
        let pattern = search.map(like_pattern);
        self.with_conn(|conn| {
            let filter = r"WHERE (?1 IS NULL
                   OR p.title LIKE ?1 ESCAPE '\'
                   OR u.name LIKE ?1 ESCAPE '\')";

            let sql = format!(
                "{POST_SELECT} {filter}
                 ORDER BY p.published_date DESC, p.id DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, limit, offset as i64], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql =
                format!("SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.author_id {filter}");
            let total: i64 = conn.query_row(&count_sql, params![pattern], |r| r.get(0))?;

            Ok((rows, total.max(0) as u64))
        })
    }

    // -- Comments --

    /// Inserts a comment only if the post still exists. Returns `None` when
    /// it does not; nothing is written in that case.
    pub fn create_comment(&self, post_id: i64, user_id: i64, content: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO comments (content, post_id, user_id)
                 SELECT ?1, p.id, ?3 FROM posts p WHERE p.id = ?2",
                params![content, post_id, user_id],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
            Ok(conn.query_row(&sql, [id], comment_from_row).optional()?)
        })
    }

    pub fn update_comment(&self, id: i64, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated =
                conn.execute("UPDATE comments SET content = ?2 WHERE id = ?1", params![id, content])?;
            Ok(updated > 0)
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? > 0))
    }

    /// Every comment on a post, newest first.
    pub fn comments_for_post(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One page of a post's comments, newest first. `search` narrows by
    /// content and never crosses into other posts.
    pub fn list_comments(
        &self,
        post_id: i64,
        search: Option<&str>,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<CommentRow>, u64)> {
        let pattern = search.map(like_pattern);
        self.with_conn(|conn| {
            let filter = r"WHERE c.post_id = ?1 AND (?2 IS NULL OR c.content LIKE ?2 ESCAPE '\')";

            let sql = format!(
                "{COMMENT_SELECT} {filter}
                 ORDER BY c.created_at DESC, c.id DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![post_id, pattern, limit, offset as i64], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let count_sql = format!("SELECT COUNT(*) FROM comments c {filter}");
            let total: i64 = conn.query_row(&count_sql, params![post_id, pattern], |r| r.get(0))?;

            Ok((rows, total.max(0) as u64))
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], user_from_row).optional()?)
}

/// Substring pattern for `LIKE … ESCAPE '\'` with the term matched literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
