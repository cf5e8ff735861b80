pub mod camera;
pub mod detector;
pub mod overlay;
pub mod scheduler;
