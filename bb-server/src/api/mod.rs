//! HTTP API handlers for bb-server

pub mod cameras;
pub mod datasets;
pub mod events;
pub mod health;
pub mod images;
pub mod labs;
pub mod profiles;
pub mod projects;
pub mod runs;
pub mod shapes;

pub use cameras::camera_routes;
pub use datasets::dataset_routes;
pub use events::event_routes;
pub use health::health_routes;
pub use images::image_routes;
pub use labs::lab_routes;
pub use profiles::profile_routes;
pub use projects::project_routes;
pub use runs::run_routes;
