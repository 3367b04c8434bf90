//! Repository for the `objects` table.

use glossa_core::image::NewObject;
use glossa_core::types::DbId;
use sqlx::PgPool;

use crate::models::image::ObjectRow;

/// Column list for `objects` queries.
const COLUMNS: &str = "\
    id, image_id, label_id, bbox_x, bbox_y, bbox_width, bbox_height, \
    position, created_at";

/// Provides CRUD operations for objects detected in images.
pub struct ObjectRepo;

impl ObjectRepo {
    /// Insert an object at the end of its image's object list.
    pub async fn create(pool: &PgPool, input: &NewObject) -> Result<ObjectRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO objects \
                 (image_id, label_id, bbox_x, bbox_y, bbox_width, bbox_height, position) \
             SELECT $1, $2, $3, $4, $5, $6, COALESCE(MAX(position) + 1, 0) \
             FROM objects WHERE image_id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ObjectRow>(&query)
            .bind(input.image_id)
            .bind(input.label_id)
            .bind(input.bbox.x)
            .bind(input.bbox.y)
            .bind(input.bbox.width)
            .bind(input.bbox.height)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ObjectRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM objects WHERE id = $1");
        sqlx::query_as::<_, ObjectRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Delete an object; its annotations go with it.
    ///
    /// Returns the deleted row and the distinct concept ids its
    /// annotations referenced, or `None` if no such object exists.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<Option<(ObjectRow, Vec<DbId>)>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let concept_ids = sqlx::query_scalar::<_, Vec<DbId>>(
            "SELECT COALESCE(array_agg(DISTINCT c.concept_id ORDER BY c.concept_id), '{}') \
             FROM annotations a \
             CROSS JOIN LATERAL unnest(a.concept_ids) AS c(concept_id) \
             WHERE a.object_id = $1",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!("DELETE FROM objects WHERE id = $1 RETURNING {COLUMNS}");
        let deleted = sqlx::query_as::<_, ObjectRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(deleted.map(|row| (row, concept_ids)))
    }
}
