#[cfg(test)]
mod tests {
    use crate::config::args::*;

    const SOURCE: &str = "rgw1.local:7480:source_access_key:source_secret_key";
    const TARGET: &str = "rgw2.local:7480:target_access_key:target_secret_key";

    #[test]
    fn with_default_value() {
        init_dummy_tracing_subscriber();

        let args = vec!["rgw-migrate", SOURCE, TARGET];

        let config = build_config_from_args(args).unwrap();

        let tracing_config = config.tracing_config.unwrap();
        assert_eq!(tracing_config.tracing_level, log::Level::Info);
        assert!(!tracing_config.json_tracing);
        assert!(!tracing_config.span_events_tracing);
        assert!(!tracing_config.disable_color_tracing);
    }

    #[test]
    fn with_custom_value() {
        init_dummy_tracing_subscriber();

        let args = vec![
            "rgw-migrate",
            "-vv",
            "--json-tracing",
            "--span-events-tracing",
            "--disable-color-tracing",
            SOURCE,
            TARGET,
        ];

        let config = build_config_from_args(args).unwrap();

        let tracing_config = config.tracing_config.unwrap();
        assert_eq!(tracing_config.tracing_level, log::Level::Trace);
        assert!(tracing_config.json_tracing);
        assert!(tracing_config.span_events_tracing);
        assert!(tracing_config.disable_color_tracing);
    }

    #[test]
    fn quiet() {
        init_dummy_tracing_subscriber();

        let args = vec!["rgw-migrate", "-q", SOURCE, TARGET];
        let config = build_config_from_args(args).unwrap();
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Warn
        );

        let args = vec!["rgw-migrate", "-qqqq", SOURCE, TARGET];
        let config = build_config_from_args(args).unwrap();
        assert!(config.tracing_config.is_none());
    }

    #[test]
    fn dry_run_is_never_quieter_than_info() {
        init_dummy_tracing_subscriber();

        let args = vec!["rgw-migrate", "--dry-run", "-q", SOURCE, TARGET];
        let config = build_config_from_args(args).unwrap();
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Info
        );

        let args = vec!["rgw-migrate", "--dry-run", "-qqqq", "--json-tracing", SOURCE, TARGET];
        let config = build_config_from_args(args).unwrap();
        let tracing_config = config.tracing_config.unwrap();
        assert_eq!(tracing_config.tracing_level, log::Level::Info);
        assert!(!tracing_config.json_tracing);

        let args = vec!["rgw-migrate", "--dry-run", "-v", SOURCE, TARGET];
        let config = build_config_from_args(args).unwrap();
        assert_eq!(
            config.tracing_config.unwrap().tracing_level,
            log::Level::Debug
        );
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
