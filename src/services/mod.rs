// Services of the synchronization core.
// Change-feed supervision, input validation, settings and logging setup.

pub mod change_feed_supervisor;
pub mod logging;
pub mod settings_engine;
pub mod validation;
