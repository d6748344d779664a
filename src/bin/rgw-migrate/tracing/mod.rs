use std::env;

use rusty_fork::rusty_fork_test;
use tracing_subscriber::fmt::format::FmtSpan;

use rgw_migrate::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // RUST_LOG replaces the crate-only filter, so targets are worth showing then
    let (event_filter, show_target) = match env::var(EVENT_FILTER_ENV_VAR) {
        Ok(filter) => (filter, true),
        Err(_) => (format!("rgw_migrate={}", config.tracing_level), false),
    };

    let subscriber_builder = tracing_subscriber::fmt()
        .compact()
        .with_ansi(!config.disable_color_tracing)
        .with_span_events(fmt_span)
        .with_env_filter(event_filter)
        .with_target(show_target);

    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

rusty_fork_test! {
    #[test]
    fn init_json_tracing() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: true,
            span_events_tracing: false,
            disable_color_tracing: false,
        });
    }

    #[test]
    fn init_default_tracing() {
        // runs in its own process
        unsafe { env::remove_var(EVENT_FILTER_ENV_VAR) };

        init_tracing(&TracingConfig {
            tracing_level: log::Level::Debug,
            json_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: false,
        });
        ::tracing::debug!("tracing initialized.");
    }

    #[test]
    fn init_span_events_without_color() {
        init_tracing(&TracingConfig {
            tracing_level: log::Level::Trace,
            json_tracing: false,
            span_events_tracing: true,
            disable_color_tracing: true,
        });
    }

    #[test]
    fn init_with_rust_log() {
        // runs in its own process
        unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "rgw_migrate=trace,reqwest=debug") };

        init_tracing(&TracingConfig {
            tracing_level: log::Level::Warn,
            json_tracing: false,
            span_events_tracing: false,
            disable_color_tracing: true,
        });
    }
}
