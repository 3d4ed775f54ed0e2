pub mod cli;
pub mod handler;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod tasks;

pub use cli::Cli;
pub use pipeline::{spawn_pipeline, SilentSource, StdinPcmSource};
pub use server::serve;
pub use session::SessionManager;
pub use state::AppState;
pub use tasks::spawn_background_tasks;
