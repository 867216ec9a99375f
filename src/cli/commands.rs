//! Command dispatch

use std::io::{self, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::TreeBuildService;
use crate::cli::args::{BuildArgs, Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::build_config::BuildConfig;
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;
use crate::tree_traits::TreeNodeConvert;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage("no command given, see --help".into()));
    };
    if let Commands::Completion { shell } = command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let container = ServiceContainer::new(settings);
    match command {
        Commands::Build(args) => cmd_build(&container, args),
        Commands::Validate {
            tree,
            max_children,
            json,
        } => cmd_validate(&container, tree, *max_children, *json),
        Commands::Themes { items, themes, top } => cmd_themes(&container, items, themes.as_deref(), *top),
        Commands::Config { command } => cmd_config(&container, command),
        Commands::Completion { .. } => Ok(()),
    }
}

/// Command-line flags over configured values.
pub fn effective_build_config(base: &BuildConfig, args: &BuildArgs) -> BuildConfig {
    let mut config = base.clone();
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(max) = args.max_children {
        config.max_children = max;
    }
    if let Some(chaos) = args.chaos {
        config.chaos = chaos;
    }
    if args.convergence {
        config.convergence = true;
    }
    if args.no_auto_fix {
        config.auto_fix = false;
    }
    config
}

#[instrument(level = "debug", skip(container))]
fn cmd_build(container: &ServiceContainer, args: &BuildArgs) -> CliResult<()> {
    let config = effective_build_config(&container.settings.build, args);
    debug!(?config, "effective build config");

    let items = container.build.load_items(&args.items)?;
    if items.is_empty() {
        output::warning(&format!("{}: no items", args.items.display()));
    }
    let hints = container.build.load_hints(args.themes.as_deref(), args.chains.as_deref())?;
    let built = container.build.build(&items, &hints, &config)?;
    let pretty = container.settings.output.pretty && !args.compact;

    if args.show {
        for school in &built.schools {
            eprintln!("{}", school.to_tree_string());
        }
    }
    match &args.output {
        Some(path) => {
            container.build.write_document(&built.document, path, pretty)?;
            output::action("wrote", &path.display());
        }
        None => {
            let rendered = TreeBuildService::render(&built.document, pretty)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{rendered}").map_err(|e| InfraError::io("write document to stdout", e))?;
        }
    }

    for school in &built.schools {
        output::report(&school.report);
    }
    if !built.cross_links.is_empty() {
        output::action("cross-school", &format!("{} link(s)", built.cross_links.len()));
    }
    output::action("seed", &built.document.seed);
    output::summary(&built.document.validation);
    Ok(())
}

#[instrument(level = "debug", skip(container))]
fn cmd_validate(container: &ServiceContainer, tree: &Path, max_children: Option<usize>, json: bool) -> CliResult<()> {
    let max = BuildConfig {
        max_children: max_children.unwrap_or(container.settings.build.max_children),
        ..BuildConfig::default()
    }
    .normalized()
    .max_children;
    let (reports, summary) = container.validation.validate_file(tree, max)?;

    if json {
        let rendered = serde_json::to_string_pretty(&reports).map_err(|e| InfraError::json("render reports", e))?;
        output::info(&rendered);
    } else {
        for report in &reports {
            output::report(report);
        }
    }
    output::summary(&summary);

    if summary.all_valid {
        Ok(())
    } else {
        Err(CliError::ValidationFailed {
            invalid: summary.total_schools - summary.valid_schools,
            total: summary.total_schools,
        })
    }
}

#[instrument(level = "debug", skip(container))]
fn cmd_themes(container: &ServiceContainer, items: &Path, themes: Option<&Path>, top: Option<usize>) -> CliResult<()> {
    let mut config = container.settings.build.clone();
    if let Some(top) = top {
        config.top_themes_per_school = top;
    }
    let loaded = container.build.load_items(items)?;
    let hints = container.build.load_hints(themes, None)?;

    for (school, keywords) in container.build.themes(&loaded, &hints, &config) {
        output::header(&school);
        if keywords.is_empty() {
            output::detail(&"(none)");
        } else {
            output::detail(&keywords.join(", "));
        }
    }
    Ok(())
}

fn cmd_config(container: &ServiceContainer, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&container.settings.to_toml()?),
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => match global_config_path() {
            Some(path) => output::info(&path.display()),
            None => output::warning("no home directory, global config disabled"),
        },
    }
    Ok(())
}
