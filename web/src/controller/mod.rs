pub mod broadcast_controller;
pub mod event_stream_controller;
pub mod health_check_controller;
