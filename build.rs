// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

const DEFAULT_DB_PATH: &str = "/var/lib/rpmsolve/rpmsolve.db";

fn db_path_arg() -> Arg {
    Arg::new("db_path")
        .short('d')
        .long("db-path")
        .value_name("PATH")
        .default_value(DEFAULT_DB_PATH)
        .help("Database path")
}

fn catalog_arg() -> Arg {
    Arg::new("catalog")
        .short('c')
        .long("catalog")
        .value_name("PATH")
        .required(true)
        .help("Catalog: repository directory, primary.xml[.gz|.zst], JSON or .rpm")
}

fn masks_arg() -> Arg {
    Arg::new("masks")
        .required(true)
        .num_args(1..)
        .help("Package masks: name or name#[epoch:]version[-release]")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn resolve_flags() -> Vec<Arg> {
    vec![
        flag("no-follow", "Do not pull in dependencies"),
        flag("nodeps", "Ignore unresolved and orphaned requirements"),
        flag("force", "Ignore conflicts with installed packages"),
        flag("best-effort", "Drop packages that cannot be installed instead of failing"),
        flag("no-upgrade", "Install alongside installed versions instead of replacing them"),
        flag("reinstall", "Reinstall packages that are already installed"),
        flag("downgrade", "Allow replacing installed packages with older ones"),
        flag("greedy", "Upgrade orphans and remove packages nothing needs anymore"),
        flag("multilib", "Apply multilib color filtering"),
    ]
}

fn build_cli() -> Command {
    Command::new("rpmsolve")
        .version(env!("CARGO_PKG_VERSION"))
        .author("rpmsolve Contributors")
        .about("Dependency resolution and transaction planning for RPM packages")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Resolver configuration file (.toml or .json)"),
        )
        .subcommand(
            Command::new("init")
                .about("Initialize the installed-package database")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("import")
                .about("Record catalog packages as installed without resolving anything")
                .arg(Arg::new("catalog").required(true).help("Catalog path"))
                .arg(Arg::new("masks").num_args(0..).help("Packages to import (all if omitted)"))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Plan the installation of packages from a catalog")
                .arg(masks_arg())
                .arg(catalog_arg())
                .arg(db_path_arg())
                .arg(flag("apply", "Record the plan in the database"))
                .args(resolve_flags()),
        )
        .subcommand(
            Command::new("remove")
                .about("Plan the removal of installed packages")
                .arg(masks_arg())
                .arg(db_path_arg())
                .arg(flag("apply", "Record the plan in the database"))
                .args(resolve_flags()),
        )
        .subcommand(
            Command::new("order")
                .about("Print the transaction order of catalog packages")
                .arg(masks_arg())
                .arg(catalog_arg())
                .arg(flag("uninstall", "Order for removal instead of installation")),
        )
        .subcommand(
            Command::new("search")
                .about("Search a catalog by name pattern")
                .arg(Arg::new("pattern").required(true).help("Glob pattern"))
                .arg(catalog_arg()),
        )
        .subcommand(
            Command::new("desc")
                .about("Describe a catalog package and its relations")
                .arg(Arg::new("mask").required(true).help("Package mask"))
                .arg(catalog_arg())
                .arg(flag("json", "Print the package record as JSON")),
        )
        .subcommand(
            Command::new("query")
                .about("Query installed packages")
                .arg(Arg::new("name").help("Package name (all if omitted)"))
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show changeset history")
                .arg(db_path_arg()),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("rpmsolve.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
