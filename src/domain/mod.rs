pub mod models;
pub mod task_list;
pub mod timer;
