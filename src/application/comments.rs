//! Batched comment submission: a single request carries several independent
//! sub-forms, each validated on its own.

use std::sync::Arc;

use metrics::counter;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{CommentsRepo, NewCommentParams, RepoError};
use crate::domain::entities::CommentRecord;

pub const AUTHOR_MAX_CHARS: usize = 100;
pub const CONTENT_MAX_CHARS: usize = 2_000;

/// How many blank sub-forms the detail page offers by default.
pub const BLANK_FORMS: usize = 3;

/// Raw values of one sub-form as submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentSubForm {
    pub author: String,
    pub content: String,
}

impl CommentSubForm {
    /// A sub-form the user never touched; skipped without complaint.
    pub fn is_blank(&self) -> bool {
        self.author.trim().is_empty() && self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentFormErrors {
    pub author: Option<String>,
    pub content: Option<String>,
}

impl CommentFormErrors {
    pub fn is_empty(&self) -> bool {
        self.author.is_none() && self.content.is_none()
    }
}

/// A validated comment waiting to be attached to a post.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentInput {
    pub author: String,
    pub content: String,
}

/// One sub-form's values plus whatever errors it earned, for redisplay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubFormState {
    pub author: String,
    pub content: String,
    pub errors: CommentFormErrors,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentFormSet {
    forms: Vec<CommentSubForm>,
}

impl CommentFormSet {
    pub fn new(forms: Vec<CommentSubForm>) -> Self {
        Self { forms }
    }

    /// Rebuilds sub-forms from the parallel `author`/`content` form fields.
    /// Ragged submissions are padded with empty strings so positions line up.
    pub fn from_parallel_fields(authors: Vec<String>, contents: Vec<String>) -> Self {
        let len = authors.len().max(contents.len());
        let mut authors = authors.into_iter();
        let mut contents = contents.into_iter();

        let forms = (0..len)
            .map(|_| CommentSubForm {
                author: authors.next().unwrap_or_default(),
                content: contents.next().unwrap_or_default(),
            })
            .collect();

        Self { forms }
    }

    pub fn forms(&self) -> &[CommentSubForm] {
        &self.forms
    }

    /// Validates every sub-form independently. Blank forms are dropped. If any
    /// non-blank form is invalid the whole batch is rejected and the per-form
    /// states come back for redisplay; nothing is persisted in that case.
    pub fn validate(&self) -> Result<Vec<CommentInput>, Vec<SubFormState>> {
        let mut accepted = Vec::new();
        let mut states = Vec::with_capacity(self.forms.len());
        let mut any_invalid = false;

        for form in &self.forms {
            if form.is_blank() {
                states.push(SubFormState {
                    author: form.author.clone(),
                    content: form.content.clone(),
                    errors: CommentFormErrors::default(),
                });
                continue;
            }

            let errors = validate_sub_form(form);
            if errors.is_empty() {
                accepted.push(CommentInput {
                    author: form.author.trim().to_string(),
                    content: form.content.trim().to_string(),
                });
            } else {
                any_invalid = true;
            }
            states.push(SubFormState {
                author: form.author.clone(),
                content: form.content.clone(),
                errors,
            });
        }

        if any_invalid {
            Err(states)
        } else {
            Ok(accepted)
        }
    }
}

fn validate_sub_form(form: &CommentSubForm) -> CommentFormErrors {
    let mut errors = CommentFormErrors::default();

    let author = form.author.trim();
    if author.is_empty() {
        errors.author = Some("Name is required".to_string());
    } else if author.chars().count() > AUTHOR_MAX_CHARS {
        errors.author = Some(format!("Name exceeds {AUTHOR_MAX_CHARS} characters"));
    }

    let content = form.content.trim();
    if content.is_empty() {
        errors.content = Some("Comment is required".to_string());
    } else if content.chars().count() > CONTENT_MAX_CHARS {
        errors.content = Some(format!("Comment exceeds {CONTENT_MAX_CHARS} characters"));
    }

    errors
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentsRepo>) -> Self {
        Self { comments }
    }

    pub async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        self.comments.list_for_post(post_id).await
    }

    /// Attaches an already-validated batch to one post, atomically.
    pub async fn attach_batch(
        &self,
        post_id: Uuid,
        inputs: Vec<CommentInput>,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let params = inputs
            .into_iter()
            .map(|input| NewCommentParams {
                post_id,
                author: input.author,
                content: input.content,
            })
            .collect::<Vec<_>>();

        let created = self.comments.insert_batch(params).await?;

        counter!("agora_comments_created_total").increment(created.len() as u64);
        info!(
            target = "agora::comments",
            post_id = %post_id,
            count = created.len(),
            "comment batch attached"
        );

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(author: &str, content: &str) -> CommentSubForm {
        CommentSubForm {
            author: author.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn blank_forms_are_skipped_and_valid_ones_accepted() {
        let formset = CommentFormSet::new(vec![
            form("ada", "First!"),
            form("", ""),
            form("grace", "Well put."),
            form("  ", " "),
        ]);

        let accepted = formset.validate().expect("batch should validate");
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].author, "ada");
        assert_eq!(accepted[1].content, "Well put.");
    }

    #[test]
    fn one_invalid_sub_form_rejects_the_batch() {
        let formset = CommentFormSet::new(vec![
            form("ada", "Fine."),
            form("no-content", ""),
        ]);

        let states = formset.validate().expect_err("batch should be rejected");
        assert_eq!(states.len(), 2);
        assert!(states[0].errors.is_empty());
        assert!(states[1].errors.content.is_some());
        assert!(states[1].errors.author.is_none());
    }

    #[test]
    fn overlong_comment_is_a_field_error() {
        let formset = CommentFormSet::new(vec![form("ada", &"x".repeat(CONTENT_MAX_CHARS + 1))]);
        let states = formset.validate().expect_err("batch should be rejected");
        assert!(states[0].errors.content.is_some());
    }

    #[test]
    fn ragged_parallel_fields_are_padded() {
        let formset = CommentFormSet::from_parallel_fields(
            vec!["ada".to_string()],
            vec!["First!".to_string(), "orphan content".to_string()],
        );

        assert_eq!(formset.forms().len(), 2);
        let states = formset.validate().expect_err("orphan row lacks an author");
        assert!(states[1].errors.author.is_some());
    }

    #[test]
    fn all_blank_batch_validates_to_nothing() {
        let formset =
            CommentFormSet::from_parallel_fields(vec![String::new(); 3], vec![String::new(); 3]);
        let accepted = formset.validate().expect("blank batch is fine");
        assert!(accepted.is_empty());
    }
}
