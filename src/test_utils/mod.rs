//! Test utilities for buckforge.
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite.
//!
//! - [`init_test_logging`] - one-time tracing setup honoring `RUST_LOG`
//! - [`TestWorkspace`] - a temporary workspace with a fake artifact repository
//!   and a project model under construction
//!
//! ```rust,no_run
//! use buckforge::scope::ScopeKind;
//! use buckforge::test_utils::TestWorkspace;
//!
//! let mut ws = TestWorkspace::new().unwrap();
//! ws.publish("junit:junit:4.12", b"junit").unwrap();
//! ws.depends(":lib", ScopeKind::Test, &["junit:junit:4.12"]);
//! let model = ws.model();
//! ```

mod workspace;

pub use workspace::TestWorkspace;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests, once per process.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
