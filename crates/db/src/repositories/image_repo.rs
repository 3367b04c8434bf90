//! Repository for the `images` table.

use glossa_core::image::NewImage;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::{ImageObjectCountsRow, ImageRow};

/// Column list for `images` queries.
const COLUMNS: &str = "id, file_name, width, height, created_at";

/// Provides CRUD operations and object counts for images.
pub struct ImageRepo;

impl ImageRepo {
    pub async fn create(pool: &PgPool, input: &NewImage) -> Result<ImageRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO images (file_name, width, height) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImageRow>(&query)
            .bind(&input.file_name)
            .bind(input.width)
            .bind(input.height)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ImageRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images WHERE id = $1");
        sqlx::query_as::<_, ImageRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Object and annotated-object counts for each existing image in
    /// `image_ids`. Missing images are omitted.
    pub async fn object_counts(
        pool: &PgPool,
        image_ids: &[DbId],
    ) -> Result<Vec<ImageObjectCountsRow>, sqlx::Error> {
        sqlx::query_as::<_, ImageObjectCountsRow>(
            "SELECT i.id AS image_id, \
                    COUNT(o.id) AS num_objects, \
                    COUNT(o.id) FILTER ( \
                        WHERE EXISTS (SELECT 1 FROM annotations a WHERE a.object_id = o.id) \
                    ) AS num_annotated \
             FROM images i \
             LEFT JOIN objects o ON o.image_id = i.id \
             WHERE i.id = ANY($1) \
             GROUP BY i.id \
             ORDER BY i.id",
        )
        .bind(image_ids)
        .fetch_all(pool)
        .await
    }
}
