pub mod device_info;
pub mod health;
pub mod node;
pub mod point_cloud;
pub mod rplidar_models;

pub use device_info::DeviceInfo;
pub use health::{DeviceHealth, HealthStatus};
pub use node::MeasurementNode;
pub use point_cloud::{Point, PointCloud};
pub use rplidar_models::{model_profile, ModelProfile, RplidarModel};
