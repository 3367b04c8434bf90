//! Projects, images and the detected objects annotations hang off.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::stats::StatsEngine;
use crate::store::Store;
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: DbId,
    pub file_name: String,
    pub width: i32,
    pub height: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImage {
    pub file_name: String,
    pub width: i32,
    pub height: i32,
}

/// Pixel-space box, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    fn validate(&self) -> CoreResult<()> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x < 0.0 || self.y < 0.0 || self.width <= 0.0 || self.height <= 0.0 {
            return Err(CoreError::Validation(format!(
                "invalid bounding box {}x{} at ({}, {})",
                self.width, self.height, self.x, self.y
            )));
        }
        Ok(())
    }
}

/// An object owned by an image; `position` orders objects within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub id: DbId,
    pub image_id: DbId,
    pub label_id: DbId,
    pub bbox: BoundingBox,
    pub position: i32,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewObject {
    pub image_id: DbId,
    pub label_id: DbId,
    pub bbox: BoundingBox,
}

/// A removed object with the concepts its annotations referenced.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedObject {
    pub object: DetectedObject,
    pub concept_ids: Vec<DbId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageObjectCounts {
    pub image_id: DbId,
    pub num_objects: i64,
    /// Objects carrying at least one annotation.
    pub num_annotated: i64,
}

/// Project, image and object management.
#[derive(Clone)]
pub struct ImageCatalog {
    store: Arc<dyn Store>,
    stats: StatsEngine,
}

impl ImageCatalog {
    pub fn new(store: Arc<dyn Store>, stats: StatsEngine) -> Self {
        Self { store, stats }
    }

    pub async fn create_project(&self, name: &str) -> CoreResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("project name must not be empty".into()));
        }
        let project = self.store.insert_project(name).await?;
        tracing::info!(project_id = project.id, "Project created");
        Ok(project)
    }

    pub async fn get_project(&self, id: DbId) -> CoreResult<Project> {
        self.store
            .find_project(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Project", id))
    }

    /// Add existing images to a project. Returns the number newly added.
    pub async fn add_images_to_project(&self, project_id: DbId, image_ids: &[DbId]) -> CoreResult<u64> {
        self.get_project(project_id).await?;
        for &image_id in image_ids {
            self.get_image(image_id).await?;
        }
        let added = self.store.add_project_images(project_id, image_ids).await?;
        if added > 0 {
            self.stats.membership_changed(project_id).await;
        }
        tracing::info!(project_id, added, "Images added to project");
        Ok(added)
    }

    pub async fn project_images(&self, project_id: DbId) -> CoreResult<Vec<DbId>> {
        self.get_project(project_id).await?;
        Ok(self.store.project_image_ids(project_id).await?)
    }

    pub async fn create_image(&self, image: &NewImage) -> CoreResult<Image> {
        if image.file_name.trim().is_empty() {
            return Err(CoreError::Validation("image file name must not be empty".into()));
        }
        if image.width <= 0 || image.height <= 0 {
            return Err(CoreError::Validation(format!(
                "image dimensions must be positive, got {}x{}",
                image.width, image.height
            )));
        }
        let created = self.store.insert_image(image).await?;
        tracing::info!(image_id = created.id, file_name = %created.file_name, "Image created");
        Ok(created)
    }

    pub async fn get_image(&self, id: DbId) -> CoreResult<Image> {
        self.store
            .find_image(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Image", id))
    }

    pub async fn add_object(&self, object: &NewObject) -> CoreResult<DetectedObject> {
        object.bbox.validate()?;
        self.get_image(object.image_id).await?;
        if self.store.find_label(object.label_id).await?.is_none() {
            return Err(CoreError::not_found("Label", object.label_id));
        }
        let created = self.store.insert_object(object).await?;
        self.stats.objects_changed(created.image_id).await;
        tracing::info!(
            object_id = created.id,
            image_id = created.image_id,
            label_id = created.label_id,
            "Object added"
        );
        Ok(created)
    }

    pub async fn get_object(&self, id: DbId) -> CoreResult<DetectedObject> {
        self.store
            .find_object(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Object", id))
    }

    /// Delete an object together with its annotations.
    pub async fn delete_object(&self, id: DbId) -> CoreResult<DetectedObject> {
        let deleted = self
            .store
            .delete_object(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Object", id))?;
        let object = deleted.object;
        self.stats
            .annotations_changed(object.label_id, object.image_id, &deleted.concept_ids)
            .await;
        tracing::info!(object_id = id, image_id = object.image_id, "Object deleted");
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::memory::InMemoryStore;
    use crate::stats::{ReadMode, DEFAULT_STALE_GRACE_SECS};

    fn catalog() -> (Arc<InMemoryStore>, ImageCatalog, StatsEngine) {
        let store = Arc::new(InMemoryStore::new());
        let stats = StatsEngine::new(store.clone(), chrono::Duration::seconds(DEFAULT_STALE_GRACE_SECS));
        (store.clone(), ImageCatalog::new(store, stats.clone()), stats)
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            x: 1.0,
            y: 2.0,
            width: 10.0,
            height: 20.0,
        }
    }

    fn image(name: &str) -> NewImage {
        NewImage {
            file_name: name.into(),
            width: 640,
            height: 480,
        }
    }

    #[tokio::test]
    async fn add_images_requires_existing_entities() {
        let (_, catalog, _) = catalog();
        let project = catalog.create_project("birds").await.unwrap();
        let img = catalog.create_image(&image("a.jpg")).await.unwrap();
        assert_matches!(
            catalog.add_images_to_project(project.id, &[img.id, 999]).await,
            Err(CoreError::NotFound { entity: "Image", id: 999 })
        );
        assert_eq!(catalog.add_images_to_project(project.id, &[img.id]).await.unwrap(), 1);
        assert_eq!(catalog.add_images_to_project(project.id, &[img.id]).await.unwrap(), 0);
        assert_eq!(catalog.project_images(project.id).await.unwrap(), vec![img.id]);
    }

    #[tokio::test]
    async fn objects_are_ordered_and_validated() {
        let (store, catalog, stats) = catalog();
        let label = crate::label::LabelService::new(store, stats)
            .create_label("fox", &[])
            .await
            .unwrap();
        let img = catalog.create_image(&image("a.jpg")).await.unwrap();
        let new = |bbox| NewObject {
            image_id: img.id,
            label_id: label.id,
            bbox,
        };
        let first = catalog.add_object(&new(bbox())).await.unwrap();
        let second = catalog.add_object(&new(bbox())).await.unwrap();
        assert_eq!((first.position, second.position), (0, 1));

        let bad = BoundingBox { width: 0.0, ..bbox() };
        assert_matches!(catalog.add_object(&new(bad)).await, Err(CoreError::Validation(_)));
        let orphan = NewObject { label_id: 77, ..new(bbox()) };
        assert_matches!(
            catalog.add_object(&orphan).await,
            Err(CoreError::NotFound { entity: "Label", id: 77 })
        );
    }

    #[tokio::test]
    async fn image_without_objects_has_full_priority() {
        let (_, catalog, stats) = catalog();
        let img = catalog.create_image(&image("a.jpg")).await.unwrap();
        assert_eq!(stats.image_priority(img.id, ReadMode::Cached).await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn invalid_images_are_rejected() {
        let (_, catalog, _) = catalog();
        assert_matches!(catalog.create_image(&image(" ")).await, Err(CoreError::Validation(_)));
        let flat = NewImage { height: 0, ..image("a.jpg") };
        assert_matches!(catalog.create_image(&flat).await, Err(CoreError::Validation(_)));
        assert_matches!(catalog.create_project("").await, Err(CoreError::Validation(_)));
    }
}
