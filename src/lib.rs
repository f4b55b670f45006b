mod app;
mod image_utils;
mod ort_service;
mod server;
mod telemetry;
mod upload;

pub mod config;
pub mod detection;
pub mod labels;
pub mod model_service;
pub mod routes;
pub mod state;

pub use app::start_app;
pub use server::create_router;
pub use telemetry::Metrics;
pub use upload::UploadStore;
