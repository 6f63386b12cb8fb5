// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use rpmsolve::config::ResolveConfig;
use rpmsolve::db::executor::DbExecutor;
use rpmsolve::db::models::{Changeset, ChangesetEntry, InstalledPackage};
use rpmsolve::db::store::DbStore;
use rpmsolve::repository::parsers::CatalogRecord;
use rpmsolve::resolver::{
    InstallPlan, OrderMode, PackageSet, Resolver, TransactionExecutor, UninstallPlan, order,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_DB_PATH: &str = "/var/lib/rpmsolve/rpmsolve.db";

#[derive(Parser)]
#[command(name = "rpmsolve")]
#[command(author, version, about = "Dependency resolution and transaction planning for RPM packages", long_about = None)]
struct Cli {
    /// Resolver configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Resolver switches that override the configuration file
#[derive(Args, Debug, Default)]
struct ResolveArgs {
    /// Do not pull in dependencies
    #[arg(long)]
    no_follow: bool,
    /// Ignore unresolved and orphaned requirements
    #[arg(long)]
    nodeps: bool,
    /// Ignore conflicts with installed packages
    #[arg(long)]
    force: bool,
    /// Drop packages that cannot be installed instead of failing
    #[arg(long)]
    best_effort: bool,
    /// Install alongside installed versions instead of replacing them
    #[arg(long)]
    no_upgrade: bool,
    #[arg(long)]
    reinstall: bool,
    #[arg(long)]
    downgrade: bool,
    /// Upgrade orphans and remove packages nothing needs anymore
    #[arg(long)]
    greedy: bool,
    /// Apply multilib color filtering
    #[arg(long)]
    multilib: bool,
}

impl ResolveArgs {
    fn apply_to(&self, config: &mut ResolveConfig) {
        config.follow &= !self.no_follow;
        config.upgrade &= !self.no_upgrade;
        config.nodeps |= self.nodeps;
        config.force |= self.force;
        config.best_effort |= self.best_effort;
        config.reinstall |= self.reinstall;
        config.downgrade |= self.downgrade;
        config.greedy |= self.greedy;
        config.multilib |= self.multilib;
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the installed-package database
    Init {
        /// Database path
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Record catalog packages as installed without resolving anything
    Import {
        /// Catalog: repository directory, primary.xml[.gz|.zst], JSON or .rpm
        catalog: PathBuf,
        /// Packages to import (all if omitted)
        masks: Vec<String>,
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Plan the installation of packages from a catalog
    Install {
        /// Package masks: name or name#[epoch:]version[-release]
        #[arg(required = true)]
        masks: Vec<String>,
        #[arg(short, long)]
        catalog: PathBuf,
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
        /// Record the plan in the database
        #[arg(long)]
        apply: bool,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// Plan the removal of installed packages
    Remove {
        /// Package masks: name or name#[epoch:]version[-release]
        #[arg(required = true)]
        masks: Vec<String>,
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
        /// Record the plan in the database
        #[arg(long)]
        apply: bool,
        #[command(flatten)]
        resolve: ResolveArgs,
    },
    /// Print the transaction order of catalog packages
    Order {
        #[arg(required = true)]
        masks: Vec<String>,
        #[arg(short, long)]
        catalog: PathBuf,
        /// Order for removal instead of installation
        #[arg(long)]
        uninstall: bool,
    },
    /// Search a catalog by name pattern
    Search {
        /// Glob pattern
        pattern: String,
        #[arg(short, long)]
        catalog: PathBuf,
    },
    /// Describe a catalog package and its relations
    Desc {
        mask: String,
        #[arg(short, long)]
        catalog: PathBuf,
        /// Print the package record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Query installed packages
    Query {
        /// Package name (all if omitted)
        name: Option<String>,
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Show changeset history
    History {
        #[arg(short, long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },
    /// Generate shell completion scripts
    Completions {
        shell: Shell,
    },
}

fn load_config(path: Option<&Path>) -> Result<ResolveConfig> {
    match path {
        Some(path) => ResolveConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(ResolveConfig::default()),
    }
}

fn load_set(catalog: &Path, config: &ResolveConfig) -> Result<PackageSet> {
    let packages = rpmsolve::repository::load_catalog(catalog)
        .with_context(|| format!("Failed to load catalog {}", catalog.display()))?;
    Ok(PackageSet::new(packages, config))
}

fn print_install_plan(set: &PackageSet, plan: &InstallPlan) {
    if plan.is_empty() {
        println!("Nothing to do.");
    }
    for id in &plan.install {
        let pkg = set.package(*id);
        if plan.dep_marked.contains(id) {
            println!("  install {} (dependency)", pkg.nevra());
        } else {
            println!("  install {}", pkg.nevra());
        }
    }
    for pkg in &plan.uninstall {
        println!("  remove  {}", pkg.nevra());
    }
    for pkg in &plan.superseded {
        println!("  keep    {}", pkg.nevra());
    }
    for id in &plan.skipped {
        println!("  skip    {} (already installed)", set.package(*id).nevra());
    }
    for id in &plan.dropped {
        println!("  drop    {}", set.package(*id).nevra());
    }
    for conflict in &plan.file_conflicts {
        println!(
            "  file conflict: {} shared by {} and {}",
            conflict.path,
            set.package(conflict.first).nevra(),
            set.package(conflict.second).nevra()
        );
    }
    for message in &plan.tolerated {
        warn!("ignored: {}", message);
    }
    for err in plan.cycle_errors(set) {
        warn!("{}", err);
    }
    if plan.interrupted {
        warn!("Resolution was interrupted; the plan is incomplete");
    }
    println!(
        "\n{} to install, {} to remove",
        plan.install.len(),
        plan.uninstall.len()
    );
}

fn print_uninstall_plan(plan: &UninstallPlan) {
    for pkg in &plan.uninstall {
        let recno = pkg.recno.unwrap_or_default();
        if plan.dep_marked.contains(&recno) {
            println!("  remove {} (requires removed package)", pkg.nevra());
        } else {
            println!("  remove {}", pkg.nevra());
        }
    }
    for message in &plan.tolerated {
        warn!("ignored: {}", message);
    }
    if plan.cycle_count > 0 {
        warn!("{} removal loop(s) broken", plan.cycle_count);
    }
    if plan.interrupted {
        warn!("Resolution was interrupted; the plan is incomplete");
    }
    println!("\n{} to remove", plan.uninstall.len());
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Init { db_path }) => {
            info!("Initializing rpmsolve database at: {}", db_path);
            rpmsolve::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Some(Commands::Import {
            catalog,
            masks,
            db_path,
        }) => {
            let set = load_set(&catalog, &config)?;
            let ids = if masks.is_empty() {
                set.ids().collect()
            } else {
                set.select(&masks)?
            };
            let packages: Vec<_> = ids.iter().map(|id| set.package(*id)).collect();

            let mut conn = rpmsolve::db::open(&db_path)?;
            let mut executor = DbExecutor::new(
                &mut conn,
                format!("Import {} packages from {}", packages.len(), catalog.display()),
            );
            executor.execute(&packages, &[])?;
            println!("Imported {} package(s)", packages.len());
            Ok(())
        }
        Some(Commands::Install {
            masks,
            catalog,
            db_path,
            apply,
            resolve,
        }) => {
            resolve.apply_to(&mut config);
            let set = load_set(&catalog, &config)?;
            let mut conn = rpmsolve::db::open(&db_path)?;

            let plan = {
                let store = DbStore::new(&conn);
                Resolver::new(&set, &config, &store).resolve_install_masks(&masks)?
            };
            print_install_plan(&set, &plan);

            if apply && plan.interrupted {
                return Err(anyhow::anyhow!("Refusing to record an incomplete plan"));
            }
            if apply && !plan.is_empty() {
                let mut executor = DbExecutor::new(&mut conn, format!("Install {}", masks.join(" ")));
                executor.execute(&plan.install_packages(&set), &plan.uninstall)?;
                println!("Recorded as changeset {}", executor.last_changeset().unwrap_or_default());
            }
            Ok(())
        }
        Some(Commands::Remove {
            masks,
            db_path,
            apply,
            resolve,
        }) => {
            resolve.apply_to(&mut config);
            let follow = config.follow;
            let set = PackageSet::new(Vec::new(), &config);
            let mut conn = rpmsolve::db::open(&db_path)?;

            let plan = {
                let store = DbStore::new(&conn);
                Resolver::new(&set, &config, &store).resolve_uninstall(&masks, follow)?
            };
            print_uninstall_plan(&plan);

            if apply && plan.interrupted {
                return Err(anyhow::anyhow!("Refusing to record an incomplete plan"));
            }
            if apply && !plan.uninstall.is_empty() {
                let mut executor = DbExecutor::new(&mut conn, format!("Remove {}", masks.join(" ")));
                executor.execute(&[], &plan.uninstall)?;
                println!("Recorded as changeset {}", executor.last_changeset().unwrap_or_default());
            }
            Ok(())
        }
        Some(Commands::Order {
            masks,
            catalog,
            uninstall,
        }) => {
            let set = load_set(&catalog, &config)?;
            let ids = set.select(&masks)?;
            let mode = if uninstall {
                OrderMode::Uninstall
            } else {
                OrderMode::Install
            };

            let result = order(&set, &ids, mode);
            for (n, id) in result.ordered.iter().enumerate() {
                println!("{:4} {}", n + 1, set.package(*id).nevra());
            }
            for members in &result.cycles {
                let names: Vec<&str> = members.iter().map(|id| set.package(*id).name.as_str()).collect();
                println!("loop: {}", names.join(" <- "));
            }
            Ok(())
        }
        Some(Commands::Search { pattern, catalog }) => {
            let set = load_set(&catalog, &config)?;
            let ids = set.search(&pattern)?;

            if ids.is_empty() {
                println!("No packages found.");
            } else {
                for id in &ids {
                    let pkg = set.package(*id);
                    println!("  {} - {}", pkg.nevra(), pkg.summary.as_deref().unwrap_or(""));
                }
                println!("\nTotal: {} package(s)", ids.len());
            }
            Ok(())
        }
        Some(Commands::Desc {
            mask,
            catalog,
            json,
        }) => {
            let set = load_set(&catalog, &config)?;
            let ids = set.select(std::slice::from_ref(&mask))?;

            for id in ids {
                let pkg = set.package(id);
                if json {
                    println!("{}", serde_json::to_string_pretty(&CatalogRecord::from_package(pkg))?);
                    continue;
                }

                println!("{}", pkg.nevra());
                if let Some(summary) = &pkg.summary {
                    println!("  Summary: {}", summary);
                }
                for edge in set.requirements(id) {
                    let reqs: Vec<String> = edge.reqs.iter().map(|r| r.to_string()).collect();
                    let providers: Vec<String> = edge
                        .target
                        .targets()
                        .iter()
                        .map(|t| set.package(*t).nevra())
                        .collect();
                    let marker = if edge.prereq { " (pre)" } else { "" };
                    println!("  Requires{}: {} -> {}", marker, reqs.join(", "), providers.join(" | "));
                }
                for req in set.unresolved(id) {
                    println!("  Unresolved: {}", req);
                }
                for other in set.required_by(id) {
                    println!("  Required by: {}", set.package(*other).nevra());
                }
                for cnfl in set.conflicts(id) {
                    let kind = if cnfl.obsoletes { "Obsoletes" } else { "Conflicts" };
                    println!("  {}: {} ({})", kind, set.package(cnfl.pkg).nevra(), cnfl.cause);
                }
                println!("  Files: {}", pkg.files.len());
            }
            Ok(())
        }
        Some(Commands::Query { name, db_path }) => {
            let conn = rpmsolve::db::open(&db_path)?;
            let rows = match name {
                Some(name) => InstalledPackage::find_by_name(&conn, &name)?,
                None => InstalledPackage::list_all(&conn)?,
            };

            if rows.is_empty() {
                println!("No packages found.");
            } else {
                println!("Installed packages:");
                for row in &rows {
                    print!("  {}-{}", row.name, row.evr());
                    if let Some(arch) = &row.architecture {
                        print!(" [{}]", arch);
                    }
                    println!();
                }
                println!("\nTotal: {} package(s)", rows.len());
            }
            Ok(())
        }
        Some(Commands::History { db_path }) => {
            let conn = rpmsolve::db::open(&db_path)?;
            let changesets = Changeset::list_all(&conn)?;

            if changesets.is_empty() {
                println!("No changeset history.");
            } else {
                println!("Changeset history:");
                for changeset in &changesets {
                    let Some(id) = changeset.id else { continue };
                    let timestamp = changeset
                        .applied_at
                        .as_deref()
                        .or(changeset.created_at.as_deref())
                        .unwrap_or("pending");

                    println!(
                        "  [{}] {} - {} ({})",
                        id,
                        timestamp,
                        changeset.description,
                        changeset.status.as_str()
                    );
                    for entry in ChangesetEntry::find_by_changeset(&conn, id)? {
                        println!("      {} {}", entry.action.as_str(), entry.nevra);
                    }
                }
                println!("\nTotal: {} changeset(s)", changesets.len());
            }
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "rpmsolve", &mut std::io::stdout());
            Ok(())
        }
        None => {
            // No command provided, show help
            println!("rpmsolve v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'rpmsolve --help' for usage information");
            Ok(())
        }
    }
}
