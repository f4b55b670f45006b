use crate::{
    config::Config,
    labels::ClassLabels,
    model_service::{ModelError, ModelService},
    ort_service::OrtModelService,
    server::HttpServer,
    state::{ModelHandle, SharedState},
    telemetry::Metrics,
    upload::UploadStore,
};
use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let uploads = match UploadStore::new(&config.upload.dir).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to create upload directory: {:?}", e);
            return Err(Box::new(e));
        }
    };
    let metrics = Arc::new(Metrics::new()?);
    let model = ModelHandle::new();

    spawn_model_loader(model.clone(), config.clone());

    let state = SharedState::new(
        model,
        uploads,
        &config.upload,
        &config.detection.target_label,
        metrics,
    );
    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    match server_handle.await {
        Ok(Err(e)) => tracing::error!("Server stopped with error: {:?}", e),
        Err(e) => tracing::error!("Server task failed: {:?}", e),
        Ok(Ok(())) => {}
    }

    Ok(())
}

/// Requests are served while the model loads; they get "Model not loaded" until it is set.
fn spawn_model_loader(handle: ModelHandle, config: Config) {
    tokio::spawn(async move {
        let loaded = tokio::task::spawn_blocking(move || load_model(&config)).await;
        match loaded {
            Ok(Ok(model_service)) => {
                handle.set(model_service).await;
                tracing::info!("Model loaded");
            }
            Ok(Err(e)) => tracing::error!("Error loading model: {}", e),
            Err(e) => tracing::error!("Model loading task failed: {}", e),
        }
    });
}

fn load_model(config: &Config) -> Result<Arc<dyn ModelService>, ModelError> {
    let labels = ClassLabels::new(&config.labels)?;
    let model_service = OrtModelService::new(&config.model, labels)?;
    Ok(Arc::new(model_service))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
