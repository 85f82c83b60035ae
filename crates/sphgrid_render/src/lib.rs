pub mod camera;
pub mod controls;
pub mod particles;
pub mod plugin;
pub mod ui;

pub use plugin::SphRenderPlugin;
