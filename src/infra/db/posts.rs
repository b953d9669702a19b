use async_trait::async_trait;
use sqlx::{FromRow, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreatePostParams, PostQueryFilter, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::domain::policy::PostListScope;
use crate::domain::types::Language;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.author_id, \
     u.username AS author_name, p.languages, p.approved, p.created_at";

/// RETURNING clauses cannot join, so the author name comes from a scalar
/// subquery there.
const POST_RETURNING: &str = "id, title, content, author_id, \
     (SELECT username FROM users WHERE users.id = posts.author_id) AS author_name, \
     languages, approved, created_at";

#[derive(Debug, FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    content: String,
    author_id: Uuid,
    author_name: String,
    languages: Vec<String>,
    approved: bool,
    created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        let languages = row
            .languages
            .iter()
            .filter_map(|tag| match tag.parse::<Language>() {
                Ok(language) => Some(language),
                Err(_) => {
                    warn!(
                        target = "agora::db",
                        post_id = %row.id,
                        tag = tag.as_str(),
                        "dropping unknown language tag"
                    );
                    None
                }
            })
            .collect();

        PostRecord {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            author_name: row.author_name,
            languages,
            approved: row.approved,
            created_at: row.created_at,
        }
    }
}

fn language_tags(languages: &[Language]) -> Vec<String> {
    languages
        .iter()
        .map(|language| language.as_str().to_string())
        .collect()
}

fn apply_scope_condition(qb: &mut QueryBuilder<'_, Postgres>, scope: PostListScope) {
    if scope == PostListScope::ApprovedOnly {
        qb.push(" AND p.approved = TRUE ");
    }
}

/// `%`, `_`, and `\` are ILIKE metacharacters; they must match literally
/// in a substring search.
fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for ch in search.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn apply_query_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q PostQueryFilter) {
    if let Some(search) = filter.title_search.as_ref() {
        qb.push(" AND p.title ILIKE ");
        qb.push_bind(like_pattern(search));
        qb.push(" ESCAPE '\\' ");
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
        page: PageRequest,
    ) -> Result<Page<PostRecord>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        apply_scope_condition(&mut count_qb, scope);
        apply_query_filter(&mut count_qb, filter);

        let total_items: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts p \
             INNER JOIN users u ON u.id = p.author_id WHERE 1=1 "
        ));
        apply_scope_condition(&mut qb, scope);
        apply_query_filter(&mut qb, filter);

        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(page.limit() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset() as i64);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let records = rows.into_iter().map(PostRecord::from).collect();
        Ok(Page::new(records, page, total_items.max(0) as u64))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts p \
             INNER JOIN users u ON u.id = p.author_id WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let CreatePostParams {
            title,
            content,
            author_id,
            languages,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (id, title, content, author_id, languages, approved, created_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, $6) \
             RETURNING {POST_RETURNING}"
        ))
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(author_id)
        .bind(language_tags(&languages))
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let UpdatePostParams {
            id,
            title,
            content,
            author_id,
            languages,
        } = params;

        if title.is_none() && content.is_none() && author_id.is_none() && languages.is_none() {
            return self.find_by_id(id).await?.ok_or(RepoError::NotFound);
        }

        let mut qb = QueryBuilder::new("UPDATE posts SET ");
        let mut assignments = qb.separated(", ");
        if let Some(title) = title {
            assignments.push("title = ");
            assignments.push_bind_unseparated(title);
        }
        if let Some(content) = content {
            assignments.push("content = ");
            assignments.push_bind_unseparated(content);
        }
        if let Some(author_id) = author_id {
            assignments.push("author_id = ");
            assignments.push_bind_unseparated(author_id);
        }
        if let Some(languages) = languages {
            assignments.push("languages = ");
            assignments.push_bind_unseparated(language_tags(&languages));
        }

        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {POST_RETURNING}"));

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn approve_post(&self, id: Uuid) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET approved = TRUE WHERE id = $1 RETURNING {POST_RETURNING}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        Ok(())
    }
}
