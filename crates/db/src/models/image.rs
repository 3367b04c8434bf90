//! Project, image and object rows.

use glossa_core::image::{BoundingBox, DetectedObject, Image, ImageObjectCounts, Project};
use glossa_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `projects` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// A row from the `images` table.
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: DbId,
    pub file_name: String,
    pub width: i32,
    pub height: i32,
    pub created_at: Timestamp,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            width: row.width,
            height: row.height,
            created_at: row.created_at,
        }
    }
}

/// A row from the `objects` table; the bounding box is stored flat.
#[derive(Debug, Clone, FromRow)]
pub struct ObjectRow {
    pub id: DbId,
    pub image_id: DbId,
    pub label_id: DbId,
    pub bbox_x: f64,
    pub bbox_y: f64,
    pub bbox_width: f64,
    pub bbox_height: f64,
    pub position: i32,
    pub created_at: Timestamp,
}

impl From<ObjectRow> for DetectedObject {
    fn from(row: ObjectRow) -> Self {
        Self {
            id: row.id,
            image_id: row.image_id,
            label_id: row.label_id,
            bbox: BoundingBox {
                x: row.bbox_x,
                y: row.bbox_y,
                width: row.bbox_width,
                height: row.bbox_height,
            },
            position: row.position,
            created_at: row.created_at,
        }
    }
}

/// Per-image object counts from the aggregation query.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct ImageObjectCountsRow {
    pub image_id: DbId,
    pub num_objects: i64,
    pub num_annotated: i64,
}

impl From<ImageObjectCountsRow> for ImageObjectCounts {
    fn from(row: ImageObjectCountsRow) -> Self {
        Self {
            image_id: row.image_id,
            num_objects: row.num_objects,
            num_annotated: row.num_annotated,
        }
    }
}
