//! Who may do what.
//!
//! Two layers: a per-operation role table checked before anything is loaded,
//! then an ownership check on the loaded resource for update and delete.
//! The ownership check never runs against a resource that does not exist;
//! callers return NotFound first.

use quill_types::api::Claims;
use quill_types::models::Role;

use crate::error::ApiError;

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl From<&Claims> for Actor {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreatePost,
    ReadPost,
    UpdatePost,
    DeletePost,
    CreateComment,
    UpdateComment,
    DeleteComment,
}

const ANY_ROLE: &[Role] = &[Role::Admin, Role::Author, Role::Reader];
const WRITERS: &[Role] = &[Role::Admin, Role::Author];

impl Operation {
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Self::CreatePost | Self::UpdatePost | Self::DeletePost => WRITERS,
            Self::ReadPost | Self::CreateComment | Self::UpdateComment | Self::DeleteComment => {
                ANY_ROLE
            }
        }
    }

    /// Whether the resource's author must match the actor (admins excepted).
    pub fn requires_ownership(self) -> bool {
        matches!(
            self,
            Self::UpdatePost | Self::DeletePost | Self::UpdateComment | Self::DeleteComment
        )
    }

    fn describe(self) -> &'static str {
        match self {
            Self::CreatePost => "create posts",
            Self::ReadPost => "read posts",
            Self::UpdatePost => "update this post",
            Self::DeletePost => "delete this post",
            Self::CreateComment => "comment",
            Self::UpdateComment => "update this comment",
            Self::DeleteComment => "delete this comment",
        }
    }
}

/// Role pre-check for an operation.
pub fn authorize(actor: Actor, op: Operation) -> Result<(), ApiError> {
    if op.allowed_roles().contains(&actor.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "You do not have permission to {}",
            op.describe()
        )))
    }
}

pub fn can_mutate(resource_author_id: i64, actor_id: i64, actor_role: Role) -> bool {
    resource_author_id == actor_id || actor_role == Role::Admin
}

/// Ownership check against a resource that has already been loaded.
pub fn ensure_can_mutate(
    actor: Actor,
    op: Operation,
    resource_author_id: i64,
) -> Result<(), ApiError> {
    if !op.requires_ownership() || can_mutate(resource_author_id, actor.id, actor.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "You do not have permission to {}",
            op.describe()
        )))
    }
}
