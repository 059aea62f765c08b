pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod goals;
pub mod output;
pub mod replay;
pub mod runtime;
pub mod summary;
pub mod sync;

pub use app::run;
pub use output::OutputFormat;
