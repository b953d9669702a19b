//! In-memory repositories and request helpers shared by the HTTP tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use http_body_util::BodyExt;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use agora::application::board::BoardService;
use agora::application::comments::CommentService;
use agora::application::pagination::{Page, PageRequest};
use agora::application::posts::PostService;
use agora::application::repos::{
    CommentsRepo, CreatePostParams, NewCommentParams, PostQueryFilter, PostsRepo, PostsWriteRepo,
    RepoError, UpdatePostParams, UsersRepo,
};
use agora::domain::entities::{CommentRecord, PostRecord, UserRecord};
use agora::domain::policy::PostListScope;
use agora::domain::types::{Language, Permission};
use agora::infra::http::{HttpState, build_router};

pub const PAGE_SIZE: u32 = 6;

#[derive(Default)]
pub struct InMemoryBoard {
    pub posts: Mutex<Vec<PostRecord>>,
    pub comments: Mutex<Vec<CommentRecord>>,
    pub users: Mutex<Vec<UserRecord>>,
}

impl InMemoryBoard {
    pub async fn seed_user(&self, user: UserRecord) {
        self.users.lock().await.push(user);
    }

    pub async fn seed_post(&self, post: PostRecord) {
        self.posts.lock().await.push(post);
    }

    pub async fn post_by_id(&self, id: Uuid) -> Option<PostRecord> {
        self.posts.lock().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn comment_count(&self) -> usize {
        self.comments.lock().await.len()
    }

    async fn author_name(&self, author_id: Uuid) -> String {
        self.users
            .lock()
            .await
            .iter()
            .find(|u| u.id == author_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PostsRepo for InMemoryBoard {
    async fn list_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError> {
        let posts = self.posts.lock().await;
        let mut matched: Vec<PostRecord> = posts
            .iter()
            .filter(|post| post.approved || scope == PostListScope::Everything)
            .filter(|post| match &filter.title_search {
                Some(needle) => post
                    .title
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page::new(items, page, total))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.post_by_id(id).await)
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryBoard {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let post = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            content: params.content,
            author_id: params.author_id,
            author_name: self.author_name(params.author_id).await,
            languages: params.languages,
            approved: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.posts.lock().await.push(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let author_name = match params.author_id {
            Some(author_id) => Some(self.author_name(author_id).await),
            None => None,
        };

        let mut posts = self.posts.lock().await;
        let post = posts
            .iter_mut()
            .find(|p| p.id == params.id)
            .ok_or(RepoError::NotFound)?;

        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(content) = params.content {
            post.content = content;
        }
        if let Some(author_id) = params.author_id {
            post.author_id = author_id;
            post.author_name = author_name.unwrap_or_default();
        }
        if let Some(languages) = params.languages {
            post.languages = languages;
        }
        Ok(post.clone())
    }

    async fn approve_post(&self, id: Uuid) -> Result<PostRecord, RepoError> {
        let mut posts = self.posts.lock().await;
        let post = posts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RepoError::NotFound)?;
        post.approved = true;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut posts = self.posts.lock().await;
        let before = posts.len();
        posts.retain(|p| p.id != id);
        if posts.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for InMemoryBoard {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let mut matched: Vec<CommentRecord> = self
            .comments
            .lock()
            .await
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn insert_batch(
        &self,
        params: Vec<NewCommentParams>,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments = self.comments.lock().await;
        let mut created = Vec::with_capacity(params.len());
        for param in params {
            let comment = CommentRecord {
                id: Uuid::new_v4(),
                post_id: param.post_id,
                author: param.author,
                content: param.content,
                created_at: OffsetDateTime::now_utc(),
            };
            comments.push(comment.clone());
            created.push(comment);
        }
        Ok(created)
    }
}

#[async_trait]
impl UsersRepo for InMemoryBoard {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.lock().await.iter().find(|u| u.id == id).cloned())
    }
}

pub fn build_app(board: Arc<InMemoryBoard>) -> Router {
    let posts_repo: Arc<dyn PostsRepo> = board.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = board.clone();
    let comments_repo: Arc<dyn CommentsRepo> = board.clone();
    let users_repo: Arc<dyn UsersRepo> = board;

    build_router(HttpState {
        board: Arc::new(BoardService::new(posts_repo.clone(), PAGE_SIZE)),
        posts: Arc::new(PostService::new(
            posts_repo,
            posts_write_repo,
            users_repo.clone(),
        )),
        comments: Arc::new(CommentService::new(comments_repo)),
        users: users_repo,
    })
}

pub fn user(username: &str) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        superuser: false,
        permissions: Vec::new(),
    }
}

pub fn moderator(username: &str) -> UserRecord {
    UserRecord {
        permissions: vec![Permission::ApprovePosts],
        ..user(username)
    }
}

pub fn superuser(username: &str) -> UserRecord {
    UserRecord {
        superuser: true,
        ..user(username)
    }
}

pub fn post(title: &str, author: &UserRecord, approved: bool, minutes_ago: i64) -> PostRecord {
    PostRecord {
        id: Uuid::new_v4(),
        title: title.to_string(),
        content: format!("Body of {title}"),
        author_id: author.id,
        author_name: author.username.clone(),
        languages: vec![Language::Rust],
        approved,
        created_at: OffsetDateTime::now_utc() - Duration::minutes(minutes_ago),
    }
}

pub async fn get(app: &Router, uri: &str, remote_user: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(username) = remote_user {
        request = request.header("x-remote-user", username);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get_with_referer(
    app: &Router,
    uri: &str,
    remote_user: Option<&str>,
    referer: &str,
) -> Response<Body> {
    let mut request = Request::builder().uri(uri).header(header::REFERER, referer);
    if let Some(username) = remote_user {
        request = request.header("x-remote-user", username);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_form(
    app: &Router,
    uri: &str,
    remote_user: Option<&str>,
    body: &str,
) -> Response<Body> {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(username) = remote_user {
        request = request.header("x-remote-user", username);
    }
    app.clone()
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect carries a Location header")
        .to_str()
        .unwrap()
}
