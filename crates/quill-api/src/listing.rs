//! Paged, filtered reads of posts and comments, and the row → wire
//! conversions that strip embedded users down to `PublicUser`.

use chrono::{DateTime, Utc};
use tracing::warn;

use quill_db::models::{CommentRow, PostRow};
use quill_types::api::{ListQuery, Page};
use quill_types::models::{Comment, Post, PublicUser};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
/// Larger requests are clamped, not rejected.
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl PageRequest {
    pub fn from_query(query: ListQuery) -> Result<Self, ApiError> {
        let page = query.page.unwrap_or(DEFAULT_PAGE);
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
        if page == 0 {
            return Err(ApiError::validation("page must be a positive integer"));
        }
        if limit == 0 {
            return Err(ApiError::validation("limit must be a positive integer"));
        }

        let search = query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            page,
            limit: limit.min(MAX_PAGE_LIMIT),
            search,
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    fn into_page<T>(self, data: Vec<T>, total: u64) -> Page<T> {
        Page {
            data,
            total,
            page: self.page,
            limit: self.limit,
        }
    }
}

pub async fn list_posts(state: &AppState, req: PageRequest) -> Result<Page<Post>, ApiError> {
    let (search, limit, offset) = (req.search.clone(), req.limit, req.offset());
    let (rows, total) =
        run_db(state, move |db| db.list_posts(search.as_deref(), limit, offset)).await?;

    let data = rows.into_iter().map(|row| post_from_row(row, None)).collect();
    Ok(req.into_page(data, total))
}

pub async fn list_comments(
    state: &AppState,
    post_id: i64,
    req: PageRequest,
) -> Result<Page<Comment>, ApiError> {
    let (search, limit, offset) = (req.search.clone(), req.limit, req.offset());
    let (rows, total) = run_db(state, move |db| {
        db.list_comments(post_id, search.as_deref(), limit, offset)
    })
    .await?;

    let data = rows.into_iter().map(comment_from_row).collect();
    Ok(req.into_page(data, total))
}

/// A single post with its author and every comment, comment authors included.
pub async fn post_detail(state: &AppState, id: i64) -> Result<Post, ApiError> {
    let (row, comments) = run_db(state, move |db| {
        let Some(row) = db.get_post(id)? else {
            return Ok(None);
        };
        let comments = db.comments_for_post(id)?;
        Ok(Some((row, comments)))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("Post not found"))?;

    let comments = comments.into_iter().map(comment_from_row).collect();
    Ok(post_from_row(row, Some(comments)))
}

pub fn post_from_row(row: PostRow, comments: Option<Vec<Comment>>) -> Post {
    Post {
        published_date: parse_timestamp(&row.published_date, "post", row.id),
        id: row.id,
        title: row.title,
        content: row.content,
        image: row.image,
        author: PublicUser {
            id: row.author_id,
            name: row.author_name,
            role: row.author_role,
        },
        comment_count: row.comment_count,
        comments,
    }
}

pub fn comment_from_row(row: CommentRow) -> Comment {
    Comment {
        created_at: parse_timestamp(&row.created_at, "comment", row.id),
        id: row.id,
        content: row.content,
        post_id: row.post_id,
        user: PublicUser {
            id: row.user_id,
            name: row.user_name,
            role: row.user_role,
        },
    }
}

fn parse_timestamp(raw: &str, kind: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {} {}: {}", raw, kind, id, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::models::Role;

    fn query(page: Option<u32>, limit: Option<u32>, search: Option<&str>) -> ListQuery {
        ListQuery {
            page,
            limit,
            search: search.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        let req = PageRequest::from_query(ListQuery::default()).unwrap();
        assert_eq!(req, PageRequest { page: 1, limit: 10, search: None });
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_offset() {
        let req = PageRequest::from_query(query(Some(2), Some(5), None)).unwrap();
        assert_eq!(req.offset(), 5);
        let req = PageRequest::from_query(query(Some(4), Some(25), None)).unwrap();
        assert_eq!(req.offset(), 75);
    }

    #[test]
    fn test_zero_is_rejected() {
        assert!(PageRequest::from_query(query(Some(0), None, None)).is_err());
        assert!(PageRequest::from_query(query(None, Some(0), None)).is_err());
    }

    #[test]
    fn test_limit_is_clamped() {
        let req = PageRequest::from_query(query(None, Some(1000), None)).unwrap();
        assert_eq!(req.limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_blank_search_is_no_search() {
        let req = PageRequest::from_query(query(None, None, Some("   "))).unwrap();
        assert_eq!(req.search, None);
        let req = PageRequest::from_query(query(None, None, Some(" rust "))).unwrap();
        assert_eq!(req.search.as_deref(), Some("rust"));
    }

    #[test]
    fn test_timestamp_formats() {
        let ts = parse_timestamp("2026-03-01T10:20:30.123Z", "post", 1);
        assert_eq!(ts.to_rfc3339(), "2026-03-01T10:20:30.123+00:00");
        let ts = parse_timestamp("2026-03-01 10:20:30", "post", 1);
        assert_eq!(ts.to_rfc3339(), "2026-03-01T10:20:30+00:00");
        assert_eq!(parse_timestamp("yesterday", "post", 1), DateTime::<Utc>::default());
    }

    #[test]
    fn test_post_row_embeds_public_author() {
        let row = PostRow {
            id: 3,
            title: "t".into(),
            content: "c".into(),
            image: Some("uploads/a.png".into()),
            published_date: "2026-03-01T10:20:30.000Z".into(),
            author_id: 5,
            author_name: "Ann".into(),
            author_role: Role::Author,
            comment_count: 2,
        };
        let post = post_from_row(row, None);
        assert_eq!(post.author, PublicUser { id: 5, name: "Ann".into(), role: Role::Author });
        let json = serde_json::to_value(&post).unwrap();
        assert!(json["author"].get("email").is_none());
        assert!(json["author"].get("password").is_none());
    }
}
