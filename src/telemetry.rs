//! Tracing setup and standardized spans.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default
/// `info` filter; `json` switches to structured output.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span for a server link, before and after the peer is identified.
    pub fn peer(link: u64, sid: Option<&str>) -> Span {
        match sid {
            Some(sid) => info_span!("peer", link, sid = %sid),
            None => info_span!("peer", link),
        }
    }

    /// Span for a locally connected user's command.
    pub fn command(name: &str, source: &str) -> Span {
        info_span!("command", name = %name, source = %source)
    }

    /// Span for one action dispatch.
    pub fn dispatch(action: &str, semantic: &'static str) -> Span {
        debug_span!("dispatch", action = %action, semantic)
    }
}
