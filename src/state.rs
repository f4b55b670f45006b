use crate::{
    config::UploadConfig, model_service::ModelService, telemetry::Metrics, upload::UploadStore,
};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Filled once the background load finishes; empty until then. Later `set`
/// calls are ignored.
#[derive(Clone, Default)]
pub struct ModelHandle {
    inner: Arc<RwLock<Option<Arc<dyn ModelService>>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaded(model_service: Arc<dyn ModelService>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(model_service))),
        }
    }

    pub async fn set(&self, model_service: Arc<dyn ModelService>) -> bool {
        let mut slot = self.inner.write().await;
        if slot.is_some() {
            tracing::warn!("Model already loaded, ignoring replacement");
            return false;
        }
        *slot = Some(model_service);
        true
    }

    pub async fn get(&self) -> Option<Arc<dyn ModelService>> {
        self.inner.read().await.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

#[derive(Clone)]
pub struct SharedState {
    pub model: ModelHandle,
    pub uploads: UploadStore,
    pub resize: (u32, u32),
    pub target_label: Arc<str>,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn new(
        model: ModelHandle,
        uploads: UploadStore,
        upload_config: &UploadConfig,
        target_label: &str,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            model,
            uploads,
            resize: (upload_config.resize_width, upload_config.resize_height),
            target_label: Arc::from(target_label),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detection::Detection, model_service::ModelError};
    use async_trait::async_trait;
    use image::DynamicImage;

    struct EmptyModel;

    struct FailingModel;

    #[async_trait]
    impl ModelService for FailingModel {
        async fn detect(&self, _image: DynamicImage) -> Result<Vec<Detection>, ModelError> {
            Err(ModelError::InvalidOutput("replaced model".to_string()))
        }
    }

    #[async_trait]
    impl ModelService for EmptyModel {
        async fn detect(&self, _image: DynamicImage) -> Result<Vec<Detection>, ModelError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_model_handle_is_write_once_read_many() {
        let handle = ModelHandle::new();
        let reader = handle.clone();
        assert!(!reader.is_loaded().await);
        assert!(reader.get().await.is_none());

        assert!(handle.set(Arc::new(EmptyModel)).await);
        assert!(!handle.set(Arc::new(FailingModel)).await);

        assert!(reader.is_loaded().await);
        let model = reader.get().await.unwrap();
        let detections = model.detect(DynamicImage::new_rgb8(1, 1)).await.unwrap();
        assert!(detections.is_empty());
    }
}
