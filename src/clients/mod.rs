pub mod gcal_client;
pub mod govee_client;
