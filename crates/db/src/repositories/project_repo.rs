//! Repository for the `projects` and `project_images` tables.

use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::ProjectRow;

/// Column list for `projects` queries.
const COLUMNS: &str = "id, name, created_at";

/// Provides project CRUD and image membership.
pub struct ProjectRepo;

impl ProjectRepo {
    pub async fn create(pool: &PgPool, name: &str) -> Result<ProjectRow, sqlx::Error> {
        let query = format!("INSERT INTO projects (name) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(name)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProjectRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, ProjectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Append images to the project in the given order, skipping members.
    ///
    /// Returns the number of images newly added.
    pub async fn add_images(pool: &PgPool, project_id: DbId, image_ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO project_images (project_id, image_id) \
             SELECT $1, t.image_id \
             FROM unnest($2::BIGINT[]) WITH ORDINALITY AS t(image_id, ord) \
             ORDER BY t.ord \
             ON CONFLICT ON CONSTRAINT uq_project_images_project_image DO NOTHING",
        )
        .bind(project_id)
        .bind(image_ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Member image ids in insertion order.
    pub async fn image_ids(pool: &PgPool, project_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT image_id FROM project_images WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Distinct projects containing any of the images.
    pub async fn ids_containing_images(pool: &PgPool, image_ids: &[DbId]) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT DISTINCT project_id FROM project_images \
             WHERE image_id = ANY($1) ORDER BY project_id",
        )
        .bind(image_ids)
        .fetch_all(pool)
        .await
    }
}
