pub mod event;
pub mod light;
pub mod status;
