pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, ClientApp, ClientPorts, UserAction};
pub use domain::models::{CompletedCycle, Settings, Task, TimerMode, TimerState};
pub use infrastructure::error::InfraError;
pub use infrastructure::http_api::{router, serve, ApiState};
