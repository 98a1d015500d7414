pub mod calendar_service;
pub mod light_mapper;
pub mod light_service;
pub mod status_service;
