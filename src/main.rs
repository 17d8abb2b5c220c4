//! Addonhost - Main entry point.
//!
//! Usage: addonhost [--config PATH] <COMMAND> [ARGS]
//!
//! Commands:
//!   list                                  List installed add-ons
//!   state <name>                          Show the lifecycle state
//!   info <name>                           Print metadata as JSON
//!   install <name> <package> [--force]    Install from a package file
//!   install <name> --remote [--force]     Download from package_url and install
//!   enable <name> [--force]               Merge files and bind hooks
//!   disable <name> [--force]              Remove merged files
//!   uninstall <name> [--force]            Delete a disabled add-on
//!   upgrade <name> <package> [--version X]
//!   tables <name>                         Tables created by install.sql
//!   hooks                                 Show the hook table
//!   config get <key> | config set <key> <value>
//!
//! Options:
//!   --config PATH    Use a specific addons.rc
//!   --field K=V      Extra form field sent with --remote downloads
//!   --version, -v    Show version
//!   --help, -h       Show this help

use std::env;
use std::path::{Path, PathBuf};

use addonhost::addons::{AddonManager, Credentials, HttpFetcher};
use addonhost::config::Config;
use addonhost::{VERSION, logging};

const USAGE: &str = "\
Usage: addonhost [--config PATH] <COMMAND> [ARGS]

Commands:
  list                                  List installed add-ons
  state <name>                          Show the lifecycle state
  info <name>                           Print metadata as JSON
  install <name> <package> [--force]    Install from a package file
  install <name> --remote [--force]     Download from package_url and install
  enable <name> [--force]               Merge files and bind hooks
  disable <name> [--force]              Remove merged files
  uninstall <name> [--force]            Delete a disabled add-on
  upgrade <name> <package> [--version X]
  tables <name>                         Tables created by install.sql
  hooks                                 Show the hook table
  config get <key> | config set <key> <value>

Options:
  --config PATH    Use a specific addons.rc
  --field K=V      Extra form field sent with --remote downloads
  --version, -v    Show version
  --help, -h       Show this help";

/// Parsed command line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Cli {
    config: Option<PathBuf>,
    force: bool,
    remote: bool,
    target_version: Option<String>,
    fields: Vec<(String, String)>,
    show_version: bool,
    show_help: bool,
    positional: Vec<String>,
}

/// Parses arguments (without the program name).
fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--force" | "-f" => cli.force = true,
            "--remote" => cli.remote = true,
            "--field" => {
                let field = iter.next().ok_or("--field needs KEY=VALUE")?;
                let (key, value) = field
                    .split_once('=')
                    .ok_or_else(|| format!("Invalid field '{}', expected KEY=VALUE", field))?;
                cli.fields.push((key.trim().to_string(), value.trim().to_string()));
            }
            "--version" | "-v" => {
                // Inside `upgrade` the flag carries the new version
                if cli.positional.first().is_some_and(|c| c == "upgrade") {
                    let version = iter.next().ok_or("--version needs a value")?;
                    cli.target_version = Some(version.clone());
                } else {
                    cli.show_version = true;
                }
            }
            "--help" | "-h" => cli.show_help = true,
            other if other.starts_with('-') => return Err(format!("Unknown option '{}'", other)),
            other => cli.positional.push(other.to_string()),
        }
    }

    Ok(cli)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().skip(1).collect();

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    if cli.show_version && cli.positional.is_empty() {
        println!("addonhost v{}", VERSION);
        return Ok(());
    }
    if cli.show_help || cli.positional.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Err(e) = logging::init(&config.log_config) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    if let Err(e) = run(&cli, &mut config) {
        tracing::error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Runs one command.
fn run(cli: &Cli, config: &mut Config) -> Result<(), Box<dyn std::error::Error>> {
    let command = cli.positional[0].as_str();
    let arg = |idx: usize, what: &str| -> Result<String, String> {
        cli.positional
            .get(idx)
            .cloned()
            .ok_or_else(|| format!("'{}' needs {}", command, what))
    };

    if command == "config" {
        return run_config(cli, config);
    }

    let mut manager = AddonManager::new(config.clone());

    match command {
        "list" => {
            let addons = manager.list_addons()?;
            if addons.is_empty() {
                println!("No add-ons installed.");
            }
            for addon in addons {
                let state = manager.state(&addon.name)?;
                println!(
                    "{:<20} {:<10} {:<10} {}",
                    addon.name, addon.version, state, addon.title
                );
            }
        }
        "state" => {
            let name = arg(1, "an add-on name")?;
            println!("{}", manager.state(&name)?);
        }
        "info" => {
            let name = arg(1, "an add-on name")?;
            let info = manager.info(&name)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        "install" => {
            let name = arg(1, "an add-on name")?;
            let info = if cli.remote {
                let url = config
                    .package_url
                    .clone()
                    .ok_or("package_url is not configured")?;
                let credentials = cli
                    .fields
                    .iter()
                    .fold(Credentials::new(), |creds, (k, v)| creds.with(k, v));
                manager.install_remote(&name, cli.force, &HttpFetcher::new(&url), &credentials)?
            } else {
                let package = arg(2, "a package path")?;
                manager.install(&name, cli.force, Path::new(&package))?
            };
            println!("Installed {} v{}", info.name, info.version);
        }
        "enable" => {
            let name = arg(1, "an add-on name")?;
            manager.enable(&name, cli.force)?;
            println!("Enabled {}", name);
        }
        "disable" => {
            let name = arg(1, "an add-on name")?;
            manager.disable(&name, cli.force)?;
            println!("Disabled {}", name);
        }
        "uninstall" => {
            let name = arg(1, "an add-on name")?;
            manager.uninstall(&name, cli.force)?;
            println!("Uninstalled {}", name);
        }
        "upgrade" => {
            let name = arg(1, "an add-on name")?;
            let package = arg(2, "a package path")?;
            let info = manager.upgrade(&name, Path::new(&package), cli.target_version.as_deref())?;
            println!("Upgraded {} to v{}", info.name, info.version);
        }
        "tables" => {
            let name = arg(1, "an add-on name")?;
            for table in manager.created_tables(&name)? {
                println!("{}", table);
            }
        }
        "hooks" => {
            let hooks = manager.hooks()?;
            for event in hooks.events() {
                let addons: Vec<&str> = hooks
                    .bindings(&event)
                    .iter()
                    .map(|b| b.addon.as_str())
                    .collect();
                println!("{:<24} {}", event, addons.join(", "));
            }
        }
        other => return Err(format!("Unknown command '{}'\n\n{}", other, USAGE).into()),
    }

    Ok(())
}

/// Handles `config get` and `config set`.
fn run_config(cli: &Cli, config: &mut Config) -> Result<(), Box<dyn std::error::Error>> {
    match cli.positional.get(1).map(String::as_str) {
        Some("get") => {
            let key = cli.positional.get(2).ok_or("'config get' needs a key")?;
            match config.get(key) {
                Some(value) => println!("{}", value),
                None => println!("{} is not set", key),
            }
        }
        Some("set") => {
            let key = cli.positional.get(2).ok_or("'config set' needs a key")?;
            let value = cli.positional.get(3).map(String::as_str).unwrap_or("");
            config.set(key, value)?;
            println!("{} = {}", key, value);
        }
        _ => return Err("usage: config get <key> | config set <key> <value>".into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_install() {
        let cli = parse_args(&args(&["install", "demo", "demo.zip", "--force"])).unwrap();
        assert_eq!(cli.positional, vec!["install", "demo", "demo.zip"]);
        assert!(cli.force);
        assert!(!cli.remote);
    }

    #[test]
    fn test_parse_version_flag() {
        let cli = parse_args(&args(&["--version"])).unwrap();
        assert!(cli.show_version);

        let cli = parse_args(&args(&["upgrade", "demo", "d.zip", "--version", "2.0.0"])).unwrap();
        assert!(!cli.show_version);
        assert_eq!(cli.target_version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_parse_remote_fields() {
        let cli = parse_args(&args(&[
            "--config",
            "/tmp/a.rc",
            "install",
            "demo",
            "--remote",
            "--field",
            "licence=abc",
        ]))
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.rc")));
        assert!(cli.remote);
        assert_eq!(cli.fields, vec![("licence".to_string(), "abc".to_string())]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
        assert!(parse_args(&args(&["--field", "novalue"])).is_err());
    }
}
