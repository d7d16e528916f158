//! Shared test bootstrap for the tarpon workspace.

use std::sync::Once;

use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize tracing and error reporting for a test.
///
/// Idempotent, so every test can call it first without coordination. Respects
/// `RUST_LOG`; defaults to showing nothing so passing runs stay quiet.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .with(ErrorLayer::default())
            .init();

        color_eyre::install().expect("color_eyre installs once");
    });
}
