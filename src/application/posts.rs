//! Authoring, edit, approval, and delete workflows for posts.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UsersRepo,
};
use crate::domain::entities::PostRecord;
use crate::domain::policy::{self, Caller};
use crate::domain::types::Language;

pub const TITLE_MAX_CHARS: usize = 200;
pub const CONTENT_MAX_CHARS: usize = 10_000;

/// Per-field messages for form redisplay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFormErrors {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
}

impl PostFormErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.author.is_none()
    }
}

#[derive(Debug, Error)]
pub enum PostError {
    #[error("post not found")]
    NotFound,
    #[error("post form failed validation")]
    Invalid(PostFormErrors),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for PostError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => PostError::NotFound,
            other => PostError::Repo(other),
        }
    }
}

/// Fields accepted by the authoring form. The author defaults to the caller
/// when the field is left blank.
#[derive(Debug, Clone, Default)]
pub struct NewPostInput {
    pub title: String,
    pub content: String,
    pub author_username: Option<String>,
    pub languages: Vec<Language>,
}

/// Fields carried by an edit submission, before the field-set policy is
/// applied. `languages` distinguishes "not submitted" from "cleared".
#[derive(Debug, Clone, Default)]
pub struct EditPostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author_username: Option<String>,
    pub languages: Option<Vec<Language>>,
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    users: Arc<dyn UsersRepo>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        users: Arc<dyn UsersRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            users,
        }
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        self.reader.find_by_id(id).await
    }

    pub async fn create(
        &self,
        caller: &Caller,
        input: NewPostInput,
    ) -> Result<PostRecord, PostError> {
        let mut errors = PostFormErrors::default();
        validate_title(&input.title, &mut errors);
        validate_content(&input.content, &mut errors);

        let author_id = match input.author_username.as_deref().map(str::trim) {
            None | Some("") => Some(caller.id),
            Some(username) => {
                let user = self.users.find_by_username(username).await?;
                match user {
                    Some(user) => Some(user.id),
                    None => {
                        errors.author = Some(format!("No user named `{username}`"));
                        None
                    }
                }
            }
        };

        if !errors.is_empty() {
            return Err(PostError::Invalid(errors));
        }

        let params = CreatePostParams {
            title: input.title.trim().to_string(),
            content: input.content.trim().to_string(),
            author_id: author_id.unwrap_or(caller.id),
            languages: input.languages,
        };

        let post = self.writer.create_post(params).await?;

        counter!("agora_posts_created_total").increment(1);
        info!(
            target = "agora::posts",
            post_id = %post.id,
            author = %caller.username,
            "post created"
        );

        Ok(post)
    }

    /// Applies the caller's field-set policy, then persists whatever survives.
    /// Disallowed fields are dropped silently rather than rejected.
    pub async fn edit(
        &self,
        caller: Option<&Caller>,
        id: Uuid,
        input: EditPostInput,
    ) -> Result<PostRecord, PostError> {
        let existing = self.reader.find_by_id(id).await?;
        let Some(existing) = existing else {
            return Err(PostError::NotFound);
        };

        let allowed = policy::editable_fields(caller);
        let mut errors = PostFormErrors::default();

        let title = match (allowed.title, input.title) {
            (true, Some(title)) => {
                validate_title(&title, &mut errors);
                Some(title.trim().to_string())
            }
            _ => None,
        };

        let content = match input.content {
            Some(content) if allowed.content => {
                validate_content(&content, &mut errors);
                Some(content.trim().to_string())
            }
            _ => None,
        };

        let author_id = match (allowed.author, input.author_username.as_deref().map(str::trim)) {
            (true, Some(username)) if !username.is_empty() => {
                match self.users.find_by_username(username).await? {
                    Some(user) => Some(user.id),
                    None => {
                        errors.author = Some(format!("No user named `{username}`"));
                        None
                    }
                }
            }
            _ => None,
        };

        let languages = if allowed.languages { input.languages } else { None };

        if !errors.is_empty() {
            return Err(PostError::Invalid(errors));
        }

        let params = UpdatePostParams {
            id: existing.id,
            title,
            content,
            author_id,
            languages,
        };

        let post = self.writer.update_post(params).await?;
        info!(target = "agora::posts", post_id = %post.id, "post edited");
        Ok(post)
    }

    /// Idempotent flag flip. Note: deliberately unguarded by a permission
    /// check to match observed behavior; see DESIGN.md before changing.
    pub async fn approve(&self, id: Uuid) -> Result<PostRecord, PostError> {
        let post = self.writer.approve_post(id).await?;

        counter!("agora_posts_approved_total").increment(1);
        info!(target = "agora::posts", post_id = %post.id, "post approved");

        Ok(post)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PostError> {
        self.writer.delete_post(id).await?;

        counter!("agora_posts_deleted_total").increment(1);
        info!(target = "agora::posts", post_id = %id, "post deleted");

        Ok(())
    }
}

fn validate_title(title: &str, errors: &mut PostFormErrors) {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        errors.title = Some("Title is required".to_string());
    } else if trimmed.chars().count() > TITLE_MAX_CHARS {
        errors.title = Some(format!("Title exceeds {TITLE_MAX_CHARS} characters"));
    }
}

fn validate_content(content: &str, errors: &mut PostFormErrors) {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        errors.content = Some("Content is required".to_string());
    } else if trimmed.chars().count() > CONTENT_MAX_CHARS {
        errors.content = Some(format!("Content exceeds {CONTENT_MAX_CHARS} characters"));
    }
}
