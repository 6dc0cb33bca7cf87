pub mod api_store;
pub mod bootstrap;
pub mod cycle_log;
pub mod ports;
pub mod task_manager;
pub mod task_sync;
pub mod timer_controller;
pub mod view;
