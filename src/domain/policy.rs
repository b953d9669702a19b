//! Authorization policy for the board, expressed as small named functions.
//!
//! Handlers never consult a global request context; the caller's identity is
//! resolved once per request and passed into these functions explicitly.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::domain::entities::UserRecord;
use crate::domain::types::Permission;

/// The authenticated identity behind a request, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub id: Uuid,
    pub username: String,
    pub superuser: bool,
    pub permissions: BTreeSet<Permission>,
}

impl Caller {
    pub fn from_user(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            superuser: user.superuser,
            permissions: user.permissions.iter().copied().collect(),
        }
    }

    /// Superusers implicitly hold every permission.
    pub fn can(&self, permission: Permission) -> bool {
        self.superuser || self.permissions.contains(&permission)
    }
}

/// Which slice of the post collection a caller is allowed to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostListScope {
    /// Approved and unapproved posts alike.
    Everything,
    ApprovedOnly,
}

/// Visibility rule: unapproved posts are reserved for callers who hold the
/// approve-posts permission. Anonymous callers hold nothing.
pub fn listing_scope(caller: Option<&Caller>) -> PostListScope {
    match caller {
        Some(caller) if caller.can(Permission::ApprovePosts) => PostListScope::Everything,
        _ => PostListScope::ApprovedOnly,
    }
}

/// The subset of post fields a caller's edit submission may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostFieldSet {
    pub title: bool,
    pub content: bool,
    pub author: bool,
    pub languages: bool,
}

impl PostFieldSet {
    pub const FULL: PostFieldSet = PostFieldSet {
        title: true,
        content: true,
        author: true,
        languages: true,
    };

    pub const CONTENT_ONLY: PostFieldSet = PostFieldSet {
        title: false,
        content: true,
        author: false,
        languages: false,
    };
}

/// Field-set selector for the edit form. Superusers edit everything; every
/// other caller is limited to the content body. Ownership is intentionally
/// not consulted here; see DESIGN.md.
pub fn editable_fields(caller: Option<&Caller>) -> PostFieldSet {
    match caller {
        Some(caller) if caller.superuser => PostFieldSet::FULL,
        _ => PostFieldSet::CONTENT_ONLY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_user() -> Caller {
        Caller {
            id: Uuid::new_v4(),
            username: "reader".to_string(),
            superuser: false,
            permissions: BTreeSet::new(),
        }
    }

    fn moderator() -> Caller {
        Caller {
            permissions: [Permission::ApprovePosts].into_iter().collect(),
            ..plain_user()
        }
    }

    fn superuser() -> Caller {
        Caller {
            superuser: true,
            ..plain_user()
        }
    }

    #[test]
    fn anonymous_callers_see_approved_posts_only() {
        assert_eq!(listing_scope(None), PostListScope::ApprovedOnly);
    }

    #[test]
    fn plain_users_see_approved_posts_only() {
        assert_eq!(listing_scope(Some(&plain_user())), PostListScope::ApprovedOnly);
    }

    #[test]
    fn moderators_see_everything() {
        assert_eq!(listing_scope(Some(&moderator())), PostListScope::Everything);
    }

    #[test]
    fn superusers_hold_every_permission_implicitly() {
        let caller = superuser();
        assert!(caller.can(Permission::ApprovePosts));
        assert_eq!(listing_scope(Some(&caller)), PostListScope::Everything);
    }

    #[test]
    fn superusers_edit_the_full_field_set() {
        assert_eq!(editable_fields(Some(&superuser())), PostFieldSet::FULL);
    }

    #[test]
    fn everyone_else_edits_content_only() {
        assert_eq!(
            editable_fields(Some(&moderator())),
            PostFieldSet::CONTENT_ONLY
        );
        assert_eq!(editable_fields(None), PostFieldSet::CONTENT_ONLY);
    }
}
