use crate::Tracer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Subscriber writing to the test harness' captured output.
///
/// Events are filtered by `RUST_LOG` plus any extra directives, defaulting to `WARN`.
#[derive(Debug, Clone, Default)]
pub struct TestTracer {
    directives: Option<String>,
}

impl TestTracer {
    /// Creates a tracer filtered by `RUST_LOG` only.
    pub const fn new() -> Self {
        Self { directives: None }
    }

    /// Adds comma separated filter directives, e.g. `"sync::filter=debug"`.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    fn env_filter(&self) -> eyre::Result<EnvFilter> {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy();
        for directive in self.directives.iter().flat_map(|d| d.split(',')) {
            let directive = directive.trim();
            if !directive.is_empty() {
                filter = filter.add_directive(directive.parse()?);
            }
        }
        Ok(filter)
    }
}

impl Tracer for TestTracer {
    fn init(self) -> eyre::Result<()> {
        let filter = self.env_filter()?;
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
        Ok(())
    }
}
