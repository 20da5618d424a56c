//! The command tree, generated from the operation catalogue.

use clap::{Arg, ArgAction, ArgMatches, Command};

use chbackup_core::address::AddressScheme;
use chbackup_core::config::{CONFIG_ENV, DEFAULT_CONFIG_PATH};
use chbackup_core::operation::Flag;
use chbackup_core::{Address, DispatchError, Operation, Options, operations};

pub const SERVE: &str = "serve";

pub fn command() -> Command {
    let mut cmd = Command::new("chbackup-agent")
        .about("Tool for easy backup of ClickHouse with cloud support")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .env(CONFIG_ENV)
                .default_value(DEFAULT_CONFIG_PATH)
                .global(true)
                .help("Config file"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Verbose output"),
        );

    for op in operations() {
        cmd = cmd.subcommand(operation_command(op, AddressScheme::default()));
    }

    cmd.subcommand(
        Command::new(SERVE)
            .about("Run the API server for this shard")
            .long_about(
                "Run the API server for this shard.\n\n\
                 Backups and the shadow directory are locked inside this server \
                 process only. CLI commands started separately on the same host \
                 are not serialized against requests the server is running.",
            )
            .arg(
                Arg::new("port")
                    .long("port")
                    .value_name("PORT")
                    .value_parser(clap::value_parser!(u16))
                    .help("Listen on PORT instead of api.shard_http_port"),
            ),
    )
}

fn long_version() -> String {
    format!(
        "{}\ngit commit: {}\nbuild date: {}",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_COMMIT").unwrap_or("unknown"),
        option_env!("BUILD_DATE").unwrap_or("unknown"),
    )
}

/// Subcommand for one operation: its flags plus a free positional list that
/// [`request`] fills into the operation's slots for `scheme`.
pub fn operation_command(op: &Operation, scheme: AddressScheme) -> Command {
    let mut cmd = Command::new(op.name)
        .about(op.about)
        .override_usage(op.usage_line(scheme));

    for flag in op.flags {
        cmd = cmd.arg(match flag {
            Flag::Tables => Arg::new("tables")
                .short('t')
                .long("tables")
                .alias("table")
                .value_name("db.table")
                .help("Table name patterns, separated by comma"),
            Flag::DiffFrom => Arg::new("diff-from")
                .long("diff-from")
                .value_name("backup_name")
                .help("Upload only the difference from this local backup"),
            Flag::Schema => Arg::new("schema")
                .short('s')
                .long("schema")
                .action(ArgAction::SetTrue)
                .conflicts_with("data")
                .help("Restore schema only"),
            Flag::Data => Arg::new("data")
                .short('d')
                .long("data")
                .action(ArgAction::SetTrue)
                .help("Restore data only"),
        });
    }

    if !op.positionals.is_empty() {
        cmd = cmd.arg(
            Arg::new("args")
                .num_args(0..)
                .value_name("ARGS")
                .hide(true),
        );
    }
    cmd
}

/// Validated address and options for `op` from its parsed subcommand. The
/// positional grammar follows the configured address scheme.
pub fn request(
    op: &Operation,
    matches: &ArgMatches,
    scheme: AddressScheme,
) -> Result<(Address, Options), DispatchError> {
    let values: Vec<String> = if op.positionals.is_empty() {
        Vec::new()
    } else {
        matches
            .get_many::<String>("args")
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    let mut params = op.params_from_positionals(scheme, &values)?;

    let accepts = |flag: Flag| op.flags.contains(&flag);
    let string = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

    if accepts(Flag::DiffFrom) {
        params.diff_from = string("diff-from");
    }
    let options = Options {
        tables: if accepts(Flag::Tables) {
            string("tables")
        } else {
            String::new()
        },
        schema: accepts(Flag::Schema) && matches.get_flag("schema"),
        data: accepts(Flag::Data) && matches.get_flag("data"),
        format: String::new(),
    };
    op.resolve(params, options)
}
