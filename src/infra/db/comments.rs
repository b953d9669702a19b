use async_trait::async_trait;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CommentsRepo, NewCommentParams, RepoError};
use crate::domain::entities::CommentRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

#[derive(Debug, FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author: String,
    content: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        CommentRecord {
            id: row.id,
            post_id: row.post_id,
            author: row.author,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id, post_id, author, content, created_at \
             FROM comments WHERE post_id = $1 \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn insert_batch(
        &self,
        comments: Vec<NewCommentParams>,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let mut created = Vec::with_capacity(comments.len());
        for comment in comments {
            let row = sqlx::query_as::<_, CommentRow>(
                "INSERT INTO comments (id, post_id, author, content, created_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, post_id, author, content, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(comment.post_id)
            .bind(comment.author)
            .bind(comment.content)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            created.push(CommentRecord::from(row));
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(created)
    }
}
