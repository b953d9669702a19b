//! View models and askama templates for the board's server-rendered pages.

use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::application::comments::SubFormState;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Page;
use crate::application::posts::PostFormErrors;
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::policy::{Caller, PostFieldSet};
use crate::domain::types::Language;

pub const HUMAN_TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year] at [hour]:[minute] UTC");

pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(HUMAN_TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| timestamp.to_string())
}

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = ErrorPageView {
        chrome,
        heading: "Not found".to_string(),
        message: "The page you were looking for does not exist.".to_string(),
    };
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Shared navbar state: who is signed in, if anyone.
#[derive(Debug, Clone, Default)]
pub struct LayoutChrome {
    pub username: Option<String>,
}

impl LayoutChrome {
    pub fn for_caller(caller: Option<&Caller>) -> Self {
        Self {
            username: caller.map(|caller| caller.username.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostCardView {
    pub id: String,
    pub title: String,
    pub author: String,
    pub languages: Vec<&'static str>,
    pub approved: bool,
    pub created: String,
}

impl PostCardView {
    pub fn from_record(post: &PostRecord) -> Self {
        Self {
            id: post.id.to_string(),
            title: post.title.clone(),
            author: post.author_name.clone(),
            languages: post.languages.iter().map(Language::label).collect(),
            approved: post.approved,
            created: format_timestamp(post.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginationView {
    pub number: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PaginationView {
    pub fn from_page<T>(page: &Page<T>) -> Self {
        Self {
            number: page.number,
            total_pages: page.total_pages(),
            has_previous: page.has_previous(),
            has_next: page.has_next(),
        }
    }

    pub fn previous_number(&self) -> u32 {
        self.number.saturating_sub(1).max(1)
    }

    pub fn next_number(&self) -> u32 {
        self.number + 1
    }
}

#[derive(Debug, Clone)]
pub struct DashboardView {
    pub chrome: LayoutChrome,
    pub posts: Vec<PostCardView>,
    pub pagination: PaginationView,
    pub query: String,
    pub moderation_visible: bool,
}

impl DashboardView {
    /// Percent-encoded query for the pager hrefs; askama escapes HTML but
    /// not URL syntax.
    pub fn query_param(&self) -> String {
        url::form_urlencoded::byte_serialize(self.query.as_bytes()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub author: String,
    pub content: String,
    pub created: String,
}

impl CommentView {
    pub fn from_record(comment: &CommentRecord) -> Self {
        Self {
            author: comment.author.clone(),
            content: comment.content.clone(),
            created: format_timestamp(comment.created_at),
        }
    }
}

/// One comment sub-form with its submitted values and any field errors.
#[derive(Debug, Clone, Default)]
pub struct CommentFormView {
    pub author: String,
    pub content: String,
    pub author_error: Option<String>,
    pub content_error: Option<String>,
}

impl CommentFormView {
    pub fn from_state(state: &SubFormState) -> Self {
        Self {
            author: state.author.clone(),
            content: state.content.clone(),
            author_error: state.errors.author.clone(),
            content_error: state.errors.content.clone(),
        }
    }

    pub fn blank_set(count: usize) -> Vec<Self> {
        (0..count).map(|_| Self::default()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct PostDetailView {
    pub chrome: LayoutChrome,
    pub post: PostCardView,
    pub content: String,
    pub comments: Vec<CommentView>,
    pub formset: Vec<CommentFormView>,
}

/// Checkbox state for one language option on the post forms.
#[derive(Debug, Clone)]
pub struct LanguageOptionView {
    pub value: &'static str,
    pub label: &'static str,
    pub checked: bool,
}

pub fn language_options(selected: &[Language]) -> Vec<LanguageOptionView> {
    Language::ALL
        .iter()
        .map(|language| LanguageOptionView {
            value: language.as_str(),
            label: language.label(),
            checked: selected.contains(language),
        })
        .collect()
}

/// The authoring and edit forms share this shape; `fields` drives which
/// controls the template renders as editable.
#[derive(Debug, Clone)]
pub struct PostFormView {
    pub chrome: LayoutChrome,
    pub heading: String,
    pub action: String,
    pub fields: PostFieldSet,
    pub title: String,
    pub content: String,
    pub author: String,
    pub languages: Vec<LanguageOptionView>,
    pub title_error: Option<String>,
    pub content_error: Option<String>,
    pub author_error: Option<String>,
}

impl PostFormView {
    pub fn apply_errors(&mut self, errors: &PostFormErrors) {
        self.title_error = errors.title.clone();
        self.content_error = errors.content.clone();
        self.author_error = errors.author.clone();
    }
}

#[derive(Debug, Clone)]
pub struct PostDeleteView {
    pub chrome: LayoutChrome,
    pub post: PostCardView,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct IndexView {
    pub chrome: LayoutChrome,
    pub rendered_at: String,
}

#[derive(Debug, Clone)]
pub struct ErrorPageView {
    pub chrome: LayoutChrome,
    pub heading: String,
    pub message: String,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: IndexView,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub view: DashboardView,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: PostDetailView,
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: PostFormView,
}

#[derive(Template)]
#[template(path = "post_delete.html")]
pub struct PostDeleteTemplate {
    pub view: PostDeleteView,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: ErrorPageView,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard_view(query: &str) -> DashboardView {
        DashboardView {
            chrome: LayoutChrome::default(),
            posts: Vec::new(),
            pagination: PaginationView {
                number: 1,
                total_pages: 1,
                has_previous: false,
                has_next: false,
            },
            query: query.to_string(),
            moderation_visible: false,
        }
    }

    #[test]
    fn pager_query_is_percent_encoded() {
        assert_eq!(dashboard_view("rust & go").query_param(), "rust+%26+go");
        assert_eq!(dashboard_view("50%").query_param(), "50%25");
        assert_eq!(dashboard_view("plain").query_param(), "plain");
    }
}
