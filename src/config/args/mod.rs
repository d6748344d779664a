use std::ffi::OsString;
use std::str::FromStr;

use clap::Parser;
use clap::builder::{ArgPredicate, NonEmptyStringValueParser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use regex::Regex;
#[cfg(feature = "version")]
use shadow_rs::shadow;

use crate::Config;
use crate::config::args::value_parser::account;
use crate::config::{ClientConfig, TracingConfig, Traversal};

mod tests;
mod value_parser;

const DEFAULT_JOBS: u16 = 20;
const DEFAULT_OWNER_ID_REGEX: &str = "^[0-9a-fA-F]{32}$";
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_MIGRATION_SUBUSER_SUFFIX: &str = "migration";
const DEFAULT_DRY_RUN: bool = false;
const DEFAULT_FORCE_TRANSFER: bool = false;
const DEFAULT_HTTPS: bool = false;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;

const IGNORED_ACCOUNT: &str = "ignored:0:ignored:ignored";

const SAME_SOURCE_AND_TARGET: &str = "SOURCE and TARGET must be different clusters\n";

#[cfg(feature = "version")]
shadow!(build);

#[derive(Parser, Clone, Debug)]
#[cfg_attr(feature = "version", command(version=format!("{} ({} {}), {}", build::PKG_VERSION, build::SHORT_COMMIT, build::BUILD_TARGET, build::RUST_VERSION)))]
pub struct CLIArgs {
    #[arg(env, help = "source cluster as host:port:admin_access_key:admin_secret_key", value_parser = account::check_account, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, IGNORED_ACCOUNT), required = false)]
    source: String,

    #[arg(env, help = "target cluster as host:port:admin_access_key:admin_secret_key", value_parser = account::check_account, default_value_if("auto_complete_shell", ArgPredicate::IsPresent, IGNORED_ACCOUNT), required = false)]
    target: String,

    /// A simulation mode. Objects are classified but nothing is created, deleted or transferred
    #[arg(long, env, default_value_t = DEFAULT_DRY_RUN, help_heading = "General")]
    dry_run: bool,

    /// Transfer every object regardless of what the target already holds
    #[arg(long, env, default_value_t = DEFAULT_FORCE_TRANSFER, help_heading = "General")]
    force_transfer: bool,

    /// Order in which the source cluster is enumerated
    #[arg(long, env, value_enum, default_value_t = Traversal::OwnerFirst, help_heading = "General")]
    traversal: Traversal,

    /// Only identities whose id matches this regular expression are migrated
    #[arg(long, env, default_value = DEFAULT_OWNER_ID_REGEX, value_parser = value_parser::regex::parse_regex, help_heading = "General")]
    owner_id_regex: String,

    /// Subuser name used for the swift credential created for transfers (<uid>:<suffix>)
    #[arg(long, env, default_value = DEFAULT_MIGRATION_SUBUSER_SUFFIX, value_parser = NonEmptyStringValueParser::new(), help_heading = "General")]
    migration_subuser_suffix: String,

    /// number of parallel transfer workers
    #[arg(short = 'j', long, env, default_value_t = DEFAULT_JOBS, value_parser = clap::value_parser!(u16).range(1..), help_heading = "Performance")]
    jobs: u16,

    /// maximum number of entries returned in a single listing request
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, value_parser = clap::value_parser!(i32).range(1..=10000), help_heading = "Performance")]
    max_keys: i32,

    /// use https for both clusters
    #[arg(long, env, default_value_t = DEFAULT_HTTPS, help_heading = "Connection Options")]
    https: bool,

    /// connect timeout (milliseconds).
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "connect_timeout",
        help_heading = "Connection Options"
    )]
    connect_timeout_milliseconds: Option<u64>,

    /// operation timeout (milliseconds). Applies to every request, including streamed object bodies.
    /// The default has no timeout.
    #[arg(
        long,
        env,
        value_name = "operation_timeout",
        help_heading = "Connection Options"
    )]
    operation_timeout_milliseconds: Option<u64>,

    /// trace verbosity(-q: show warnings and errors only, -v: show debug, -vv show trace)
    #[clap(flatten)]
    verbosity: Verbosity<InfoLevel>,

    /// show trace as json format
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Tracing/Logging")]
    json_tracing: bool,

    /// show span event tracing
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Tracing/Logging")]
    span_events_tracing: bool,

    /// disable ANSI terminal colors
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Tracing/Logging")]
    disable_color_tracing: bool,

    /// generate a auto completions script. Valid values: bash, fish, zsh, powershell, elvish.
    #[arg(long, env, value_name = "SHELL", value_parser = clap_complete::shells::Shell::from_str, help_heading = "Advanced")]
    auto_complete_shell: Option<clap_complete::shells::Shell>,
}

pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    crate::Config::try_from(config_args)
}

impl CLIArgs {
    fn validate_cluster_config(&self) -> Result<(), String> {
        self.check_same_cluster()?;

        Ok(())
    }

    fn check_same_cluster(&self) -> Result<(), String> {
        if self.auto_complete_shell.is_some() {
            return Ok(());
        }

        let source = account::parse_account(&self.source)?;
        let target = account::parse_account(&self.target)?;
        if source.is_same_endpoint(&target) {
            return Err(SAME_SOURCE_AND_TARGET.to_string());
        }

        Ok(())
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(value: CLIArgs) -> Result<Self, Self::Error> {
        value.validate_cluster_config()?;

        let mut tracing_config = value.verbosity.log_level().map(|log_level| TracingConfig {
            tracing_level: log_level,
            json_tracing: value.json_tracing,
            span_events_tracing: value.span_events_tracing,
            disable_color_tracing: value.disable_color_tracing,
        });

        // dry-run output is the per-object report, so it is never silenced
        if value.dry_run {
            tracing_config = match tracing_config {
                None => Some(TracingConfig {
                    tracing_level: log::Level::Info,
                    json_tracing: DEFAULT_JSON_TRACING,
                    span_events_tracing: DEFAULT_SPAN_EVENTS_TRACING,
                    disable_color_tracing: DEFAULT_DISABLE_COLOR_TRACING,
                }),
                Some(config) if config.tracing_level < log::Level::Info => Some(TracingConfig {
                    tracing_level: log::Level::Info,
                    ..config
                }),
                config => config,
            };
        }

        let owner_id_regex = Regex::new(&value.owner_id_regex).map_err(|e| e.to_string())?;

        Ok(Config {
            source: account::parse_account(&value.source)?,
            target: account::parse_account(&value.target)?,
            client_config: ClientConfig {
                https: value.https,
                connect_timeout_milliseconds: value.connect_timeout_milliseconds,
                operation_timeout_milliseconds: value.operation_timeout_milliseconds,
            },
            tracing_config,
            worker_size: value.jobs,
            traversal: value.traversal,
            owner_id_regex,
            dry_run: value.dry_run,
            force_transfer: value.force_transfer,
            max_keys: value.max_keys,
            migration_subuser_suffix: value.migration_subuser_suffix,
            auto_complete_shell: value.auto_complete_shell,
        })
    }
}
