//! The operation catalogue. Both transports are generated from [`operations`],
//! so the CLI and HTTP surfaces always expose the same set with the same
//! addressing rules.

use std::collections::HashMap;

use crate::address::{Address, AddressScheme, Field, Options, Params, ServerTier, Slot};
use crate::engine::EngineCall;
use crate::error::DispatchError;
use crate::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// Non-addressing flags an operation accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Tables,
    DiffFrom,
    Schema,
    Data,
}

pub type Adapter = fn(&Address, &Options) -> Result<Plan, DispatchError>;

#[derive(Debug)]
pub struct Operation {
    /// CLI subcommand name.
    pub name: &'static str,
    pub about: &'static str,
    pub usage: &'static str,
    pub method: HttpMethod,
    /// First path segment of every HTTP route for this operation.
    pub route: &'static str,
    pub positionals: &'static [Slot],
    /// Path parameters after `route`, excluding the backup kind which the
    /// address scheme inserts. Optional slots must be trailing.
    pub path: &'static [Slot],
    /// Fields that must be non-empty before the engine is called.
    pub required: &'static [Field],
    pub flags: &'static [Flag],
    adapter: Adapter,
}

const KIND_AND_NAME: &[Slot] = &[
    Slot::optional(Field::BackupKind),
    Slot::required(Field::BackupName),
];
const NAME: &[Slot] = &[Slot::required(Field::BackupName)];

static OPERATIONS: &[Operation] = &[
    Operation {
        name: "tables",
        about: "Print list of tables",
        usage: "chbackup-agent tables",
        method: HttpMethod::Get,
        route: "/tables",
        positionals: &[],
        path: &[],
        required: &[],
        flags: &[],
        adapter: plan_tables,
    },
    Operation {
        name: "create",
        about: "Create new backup",
        usage: "chbackup-agent create [-t, --tables=<db>.<table>] [backup_type] <backup_name>",
        method: HttpMethod::Post,
        route: "/create",
        positionals: KIND_AND_NAME,
        path: NAME,
        required: &[Field::BackupName],
        flags: &[Flag::Tables],
        adapter: plan_create,
    },
    Operation {
        name: "upload",
        about: "Upload backup to remote storage",
        usage: "chbackup-agent upload [--diff-from=<backup_name>] [backup_type] <backup_name>",
        method: HttpMethod::Post,
        route: "/upload",
        positionals: KIND_AND_NAME,
        path: &[
            Slot::required(Field::BackupName),
            Slot::optional(Field::DiffFrom),
        ],
        required: &[Field::BackupName],
        flags: &[Flag::DiffFrom],
        adapter: plan_upload,
    },
    Operation {
        name: "download",
        about: "Download backup from remote storage",
        usage: "chbackup-agent download [backup_type] <backup_name>",
        method: HttpMethod::Post,
        route: "/download",
        positionals: KIND_AND_NAME,
        path: NAME,
        required: &[Field::BackupName],
        flags: &[],
        adapter: plan_download,
    },
    Operation {
        name: "restore",
        about: "Create schema and restore data from backup",
        usage: "chbackup-agent restore [-t, --tables=<db>.<table>] [-s, --schema | -d, --data] [backup_type] <backup_name>",
        method: HttpMethod::Post,
        route: "/restore",
        positionals: KIND_AND_NAME,
        path: NAME,
        required: &[Field::BackupName],
        flags: &[Flag::Tables, Flag::Schema, Flag::Data],
        adapter: plan_restore,
    },
    Operation {
        name: "delete",
        about: "Delete specific backup",
        usage: "chbackup-agent delete <local|remote|all> [backup_type] <backup_name>",
        method: HttpMethod::Post,
        route: "/delete",
        positionals: &[
            Slot::required(Field::ServerTier),
            Slot::optional(Field::BackupKind),
            Slot::required(Field::BackupName),
        ],
        path: &[
            Slot::required(Field::ServerTier),
            Slot::required(Field::BackupName),
        ],
        required: &[Field::BackupName],
        flags: &[],
        adapter: plan_delete,
    },
    Operation {
        name: "list",
        about: "Print list of backups",
        usage: "chbackup-agent list [all|local|remote] [backup_type] [latest|penult]",
        method: HttpMethod::Get,
        route: "/list",
        positionals: &[
            Slot::optional(Field::ServerTier),
            Slot::optional(Field::BackupKind),
            Slot::optional(Field::Format),
        ],
        path: &[
            Slot::optional(Field::ServerTier),
            Slot::optional(Field::Format),
        ],
        required: &[],
        flags: &[],
        adapter: plan_list,
    },
    Operation {
        name: "freeze",
        about: "Freeze tables",
        usage: "chbackup-agent freeze [-t, --tables=<db>.<table>]",
        method: HttpMethod::Post,
        route: "/freeze",
        positionals: &[],
        path: &[],
        required: &[],
        flags: &[Flag::Tables],
        adapter: plan_freeze,
    },
    Operation {
        name: "clean",
        about: "Remove data in 'shadow' folder",
        usage: "chbackup-agent clean",
        method: HttpMethod::Post,
        route: "/clean",
        positionals: &[],
        path: &[],
        required: &[],
        flags: &[],
        adapter: plan_clean,
    },
    Operation {
        name: "isclean",
        about: "Report whether the 'shadow' folder is empty",
        usage: "chbackup-agent isclean",
        method: HttpMethod::Get,
        route: "/is-clean",
        positionals: &[],
        path: &[],
        required: &[],
        flags: &[],
        adapter: plan_is_clean,
    },
    Operation {
        name: "default-config",
        about: "Print default config",
        usage: "chbackup-agent default-config",
        method: HttpMethod::Get,
        route: "/default-config",
        positionals: &[],
        path: &[],
        required: &[],
        flags: &[],
        adapter: plan_default_config,
    },
];

pub fn operations() -> &'static [Operation] {
    OPERATIONS
}

pub fn find(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}

impl Operation {
    fn carries(&self, field: Field) -> bool {
        self.positionals.iter().any(|s| s.field == field)
    }

    /// Path slots for the given scheme. `Kinded` inserts the backup kind ahead
    /// of the name (or the format, for listings).
    pub fn path_slots(&self, scheme: AddressScheme) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(self.path.len() + 1);
        let mut inserted = scheme == AddressScheme::Named || !self.carries(Field::BackupKind);
        for slot in self.path {
            if !inserted && matches!(slot.field, Field::BackupName | Field::Format) {
                slots.push(Slot {
                    field: Field::BackupKind,
                    required: slot.required,
                });
                inserted = true;
            }
            slots.push(*slot);
        }
        if !inserted {
            slots.push(Slot::optional(Field::BackupKind));
        }
        slots
    }

    /// Every route template, shortest first. Each optional trailing slot adds one.
    pub fn path_templates(&self, scheme: AddressScheme) -> Vec<String> {
        let mut templates = Vec::new();
        let mut current = self.route.to_string();
        for slot in self.path_slots(scheme) {
            if !slot.required {
                templates.push(current.clone());
            }
            current.push_str("/{");
            current.push_str(slot.field.param());
            current.push('}');
        }
        templates.push(current);
        templates
    }

    /// Positional slots for the given scheme. Like the routes, `Named` has no
    /// backup kind, so `list remote latest` reads `latest` as the format.
    pub fn positional_slots(&self, scheme: AddressScheme) -> Vec<Slot> {
        self.positionals
            .iter()
            .copied()
            .filter(|slot| scheme == AddressScheme::Kinded || slot.field != Field::BackupKind)
            .collect()
    }

    /// CLI usage line for the given scheme.
    pub fn usage_line(&self, scheme: AddressScheme) -> String {
        match scheme {
            AddressScheme::Kinded => self.usage.to_string(),
            AddressScheme::Named => self.usage.replace(" [backup_type]", ""),
        }
    }

    pub fn params_from_positionals(
        &self,
        scheme: AddressScheme,
        values: &[String],
    ) -> Result<Params, DispatchError> {
        Params::from_positionals(&self.positional_slots(scheme), values)
    }

    pub fn params_from_path(
        &self,
        scheme: AddressScheme,
        path: &HashMap<String, String>,
    ) -> Params {
        Params::from_path(&self.path_slots(scheme), path)
    }

    /// Validates raw params into an address and folds positional-only options
    /// (the list format) into `options`.
    pub fn resolve(
        &self,
        params: Params,
        mut options: Options,
    ) -> Result<(Address, Options), DispatchError> {
        for field in self.required {
            if params.get(*field).is_empty() {
                return Err(DispatchError::usage(format!(
                    "{} must be defined",
                    field.label()
                )));
            }
        }

        let server_tier = if self.carries(Field::ServerTier) {
            Some(ServerTier::parse(&params.server_tier)?)
        } else {
            None
        };

        if self.carries(Field::Format) {
            options.format = params.format;
        }
        let address = Address {
            server_tier,
            backup_kind: params.backup_kind,
            backup_name: params.backup_name,
            diff_from: params.diff_from,
        };
        Ok((address, options))
    }

    pub fn plan(&self, address: &Address, options: &Options) -> Result<Plan, DispatchError> {
        (self.adapter)(address, options)
    }
}

fn plan_tables(_: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::PrintTables))
}

fn plan_create(address: &Address, options: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::CreateBackup {
        kind: address.backup_kind.clone(),
        name: address.backup_name.clone(),
        tables: options.tables.clone(),
    }))
}

fn plan_upload(address: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::Upload {
        kind: address.backup_kind.clone(),
        name: address.backup_name.clone(),
        diff_from: address.diff_from.clone(),
    }))
}

fn plan_download(address: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::Download {
        kind: address.backup_kind.clone(),
        name: address.backup_name.clone(),
    }))
}

fn plan_restore(address: &Address, options: &Options) -> Result<Plan, DispatchError> {
    if options.schema && options.data {
        return Err(DispatchError::usage(
            "--schema and --data cannot be used together",
        ));
    }
    Ok(Plan::single(EngineCall::Restore {
        kind: address.backup_kind.clone(),
        name: address.backup_name.clone(),
        tables: options.tables.clone(),
        schema_only: options.schema,
        data_only: options.data,
    }))
}

fn plan_delete(address: &Address, _: &Options) -> Result<Plan, DispatchError> {
    let kind = address.backup_kind.clone();
    let name = address.backup_name.clone();
    Ok(Plan::for_tier(
        address.tier(),
        EngineCall::RemoveBackupLocal {
            kind: kind.clone(),
            name: name.clone(),
        },
        EngineCall::RemoveBackupRemote { kind, name },
        None,
    ))
}

fn plan_list(address: &Address, options: &Options) -> Result<Plan, DispatchError> {
    let kind = address.backup_kind.clone();
    let format = options.format.clone();
    Ok(Plan::for_tier(
        address.tier(),
        EngineCall::PrintLocalBackups {
            kind: kind.clone(),
            format: format.clone(),
        },
        EngineCall::PrintRemoteBackups { kind, format },
        Some(("Local backups:", "Remote backups:")),
    ))
}

fn plan_freeze(_: &Address, options: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::Freeze {
        tables: options.tables.clone(),
    }))
}

fn plan_clean(_: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::Clean))
}

fn plan_is_clean(_: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::IsClean))
}

fn plan_default_config(_: &Address, _: &Options) -> Result<Plan, DispatchError> {
    Ok(Plan::single(EngineCall::PrintDefaultConfig))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(name: &str) -> &'static Operation {
        find(name).unwrap()
    }

    fn positional_in(
        scheme: AddressScheme,
        name: &str,
        values: &[&str],
    ) -> Result<(Address, Options), DispatchError> {
        let op = op(name);
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let params = op.params_from_positionals(scheme, &values)?;
        op.resolve(params, Options::default())
    }

    fn positional(name: &str, values: &[&str]) -> Result<(Address, Options), DispatchError> {
        positional_in(AddressScheme::Named, name, values)
    }

    fn sample(field: Field) -> &'static str {
        match field {
            Field::ServerTier => "remote",
            Field::BackupKind => "shard1",
            Field::BackupName => "nightly",
            Field::DiffFrom => "sunday",
            Field::Format => "latest",
        }
    }

    #[test]
    fn catalogue_is_complete_and_unique() {
        let names: Vec<_> = operations().iter().map(|op| op.name).collect();
        assert_eq!(
            names,
            [
                "tables",
                "create",
                "upload",
                "download",
                "restore",
                "delete",
                "list",
                "freeze",
                "clean",
                "isclean",
                "default-config"
            ]
        );
        let mut routes: Vec<_> = operations().iter().map(|op| op.route).collect();
        routes.sort_unstable();
        routes.dedup();
        assert_eq!(routes.len(), names.len());
    }

    #[test]
    fn optional_path_slots_are_trailing() {
        for op in operations() {
            for scheme in [AddressScheme::Named, AddressScheme::Kinded] {
                let slots = op.path_slots(scheme);
                if let Some(first_optional) = slots.iter().position(|s| !s.required) {
                    assert!(
                        slots[first_optional..].iter().all(|s| !s.required),
                        "{} has a required slot after an optional one",
                        op.name
                    );
                }
            }
        }
    }

    #[test]
    fn named_templates() {
        assert_eq!(
            op("create").path_templates(AddressScheme::Named),
            ["/create/{backup_name}"]
        );
        assert_eq!(
            op("upload").path_templates(AddressScheme::Named),
            ["/upload/{backup_name}", "/upload/{backup_name}/{diff_from}"]
        );
        assert_eq!(
            op("list").path_templates(AddressScheme::Named),
            ["/list", "/list/{server_type}", "/list/{server_type}/{format}"]
        );
        assert_eq!(
            op("delete").path_templates(AddressScheme::Named),
            ["/delete/{server_type}/{backup_name}"]
        );
        assert_eq!(op("tables").path_templates(AddressScheme::Named), ["/tables"]);
    }

    #[test]
    fn kinded_templates_insert_backup_type_before_name() {
        assert_eq!(
            op("create").path_templates(AddressScheme::Kinded),
            ["/create/{backup_type}/{backup_name}"]
        );
        assert_eq!(
            op("delete").path_templates(AddressScheme::Kinded),
            ["/delete/{server_type}/{backup_type}/{backup_name}"]
        );
        assert_eq!(
            op("list").path_templates(AddressScheme::Kinded),
            [
                "/list",
                "/list/{server_type}",
                "/list/{server_type}/{backup_type}",
                "/list/{server_type}/{backup_type}/{format}"
            ]
        );
        assert_eq!(op("freeze").path_templates(AddressScheme::Kinded), ["/freeze"]);
    }

    #[test]
    fn missing_backup_name_is_usage_error() {
        for name in ["create", "upload", "download", "restore"] {
            let err = positional(name, &[""]).unwrap_err();
            assert!(
                matches!(err, DispatchError::Usage(ref m) if m == "backup name must be defined"),
                "{name}: {err}"
            );
        }
        let err = positional("delete", &["local", ""]).unwrap_err();
        assert!(matches!(err, DispatchError::Usage(_)));
    }

    #[test]
    fn unknown_tier_is_rejected() {
        let err = positional("delete", &["bogus", "nightly"]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTier(t) if t == "bogus"));
        let err = positional("list", &["sideways"]).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTier(_)));
    }

    #[test]
    fn empty_tier_means_all() {
        let (address, _) = positional("list", &[]).unwrap();
        assert_eq!(address.server_tier, Some(ServerTier::All));
        let (address, _) = positional("delete", &["", "nightly"]).unwrap();
        assert_eq!(address.tier(), ServerTier::All);
    }

    #[test]
    fn list_format_moves_into_options() {
        let (address, options) =
            positional_in(AddressScheme::Kinded, "list", &["remote", "shard1", "latest"]).unwrap();
        assert_eq!(address.server_tier, Some(ServerTier::Remote));
        assert_eq!(address.backup_kind, "shard1");
        assert_eq!(options.format, "latest");
    }

    #[test]
    fn named_list_second_value_is_the_format() {
        let (address, options) = positional("list", &["remote", "latest"]).unwrap();
        assert_eq!(address.server_tier, Some(ServerTier::Remote));
        assert_eq!(address.backup_kind, "");
        assert_eq!(options.format, "latest");

        let err = positional("list", &["remote", "shard1", "latest"]).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn named_scheme_takes_no_backup_kind() {
        let err = positional("create", &["shard1", "nightly"]).unwrap_err();
        assert!(matches!(err, DispatchError::Usage(m) if m == "unexpected argument 'nightly'"));

        let (address, _) =
            positional_in(AddressScheme::Kinded, "create", &["shard1", "nightly"]).unwrap();
        assert_eq!(address.backup_kind, "shard1");
    }

    #[test]
    fn usage_line_follows_scheme() {
        assert_eq!(
            op("list").usage_line(AddressScheme::Named),
            "chbackup-agent list [all|local|remote] [latest|penult]"
        );
        assert_eq!(
            op("list").usage_line(AddressScheme::Kinded),
            "chbackup-agent list [all|local|remote] [backup_type] [latest|penult]"
        );
    }

    #[test]
    fn upload_forwards_diff_from_unchanged() {
        let op = op("upload");
        let mut params = op
            .params_from_positionals(AddressScheme::Named, &["nightly".to_string()])
            .unwrap();
        params.diff_from = "sunday".into();
        let (address, options) = op.resolve(params, Options::default()).unwrap();
        let plan = op.plan(&address, &options).unwrap();
        assert_eq!(
            plan.calls().collect::<Vec<_>>(),
            [&EngineCall::Upload {
                kind: String::new(),
                name: "nightly".into(),
                diff_from: "sunday".into(),
            }]
        );

        let (address, options) = positional("upload", &["nightly"]).unwrap();
        let plan = op.plan(&address, &options).unwrap();
        assert!(matches!(
            plan.calls().next(),
            Some(EngineCall::Upload { diff_from, .. }) if diff_from.is_empty()
        ));
    }

    #[test]
    fn restore_scope_flags_are_exclusive() {
        let (address, _) = positional("restore", &["nightly"]).unwrap();
        let options = Options {
            schema: true,
            data: true,
            ..Options::default()
        };
        assert!(matches!(
            op("restore").plan(&address, &options),
            Err(DispatchError::Usage(_))
        ));
    }

    #[test]
    fn delete_all_fans_out_local_first() {
        let (address, options) = positional("delete", &["all", "nightly"]).unwrap();
        let plan = op("delete").plan(&address, &options).unwrap();
        let names: Vec<_> = plan.calls().map(EngineCall::name).collect();
        assert_eq!(names, ["remove_backup_local", "remove_backup_remote"]);
        assert!(plan.steps().iter().all(|s| s.heading.is_none()));
    }

    #[test]
    fn every_route_matches_its_positional_form() {
        for scheme in [AddressScheme::Named, AddressScheme::Kinded] {
            for op in operations() {
                let slots = op.path_slots(scheme);
                let positional: Vec<Field> =
                    op.positional_slots(scheme).iter().map(|s| s.field).collect();

                for depth in 0..=slots.len() {
                    if slots[depth..].iter().any(|s| s.required) {
                        continue;
                    }
                    let given = &slots[..depth];

                    let path: HashMap<String, String> = given
                        .iter()
                        .map(|s| (s.field.param().to_string(), sample(s.field).to_string()))
                        .collect();
                    let from_path = op
                        .resolve(op.params_from_path(scheme, &path), Options::default())
                        .unwrap();

                    let values: Vec<String> = given
                        .iter()
                        .filter(|s| positional.contains(&s.field))
                        .map(|s| sample(s.field).to_string())
                        .collect();
                    let mut params = op.params_from_positionals(scheme, &values).unwrap();
                    if given.iter().any(|s| s.field == Field::DiffFrom) {
                        params.diff_from = sample(Field::DiffFrom).to_string();
                    }
                    let from_cli = op.resolve(params, Options::default()).unwrap();

                    assert_eq!(from_path, from_cli, "{} {scheme:?} {path:?}", op.name);
                }
            }
        }
    }
}
