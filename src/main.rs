/*
 * aurguard - Trust and resolution core for AUR package helpers.
 * Copyright (C) 2025  compiledkernel-idk and aurguard contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use console::style;
use std::cmp::Ordering;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aurguard::aur::{parse_recipe, Pkgbuild};
use aurguard::config::Config;
use aurguard::deps::{parse_dependency, Version};
use aurguard::pacman::{extract_version, PacmanConf};
use aurguard::security::{scan_recipe, ScanReport};
use aurguard::{logging, SecuritySeverity};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Copyright (C) 2025  compiledkernel-idk and aurguard contributors\n",
    "License GPLv3+: GNU GPL version 3 or later <https://gnu.org/licenses/gpl.html>\n\n",
    "This is free software; you are free to change and redistribute it.\n",
    "There is NO WARRANTY, to the extent permitted by law."
);

#[derive(Parser)]
#[command(name = "aurguard")]
#[command(version = VERSION)]
#[command(long_version = LONG_VERSION)]
#[command(about = "Version resolution, PKGBUILD parsing and build-script scanning for AUR helpers.")]
struct Cli {
    /// Use this config file instead of the system and user ones
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse PKGBUILDs and report blocklisted commands
    Scan {
        #[arg(value_name = "PKGBUILD", required = true)]
        files: Vec<PathBuf>,
        /// Print findings as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare two versions, printing -1, 0 or 1
    Vercmp { a: String, b: String },
    /// Check whether a version satisfies a dependency such as `foo>=1.2`
    Satisfies { dependency: String, version: String },
    /// Print pacman.conf directives
    Conf {
        /// pacman.conf to read (defaults to the configured path)
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Print only this directive's values
        key: Option<String>,
    },
    /// Read `pacman -Qi` / `-Si` output on stdin and print the version
    QueryVersion,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => {
            let config = Config::load_from(path)?;
            config.validate()?;
            config
        }
        None => Config::load()?,
    };

    let level = if cli.verbose { "debug" } else { config.logging.level.as_str() };
    logging::init_with_file(level, config.logging.file.as_deref());

    match cli.command {
        Commands::Scan { files, json } => scan(&config, &files, json),
        Commands::Vercmp { a, b } => {
            let code = match Version::parse(&a).cmp(&Version::parse(&b)) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            };
            println!("{}", code);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Satisfies { dependency, version } => {
            let dep = parse_dependency(&dependency)
                .ok_or_else(|| anyhow!("invalid dependency specifier `{}`", dependency))?;
            if dep.satisfied_by(&Version::parse(&version)) {
                println!("yes");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("no");
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Conf { file, key } => {
            let path = file.unwrap_or_else(|| config.pacman.config_path.clone());
            show_conf(&path, key.as_deref())
        }
        Commands::QueryVersion => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("reading stdin")?;
            match extract_version(&input) {
                Some(version) => {
                    println!("{}", version);
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("{}", style(":: no Version field found").yellow());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn styled_severity(severity: SecuritySeverity) -> String {
    let text = style(severity.to_string());
    match severity {
        SecuritySeverity::Critical => text.red().bold(),
        SecuritySeverity::High => text.red(),
        SecuritySeverity::Medium => text.yellow(),
        SecuritySeverity::Low => text.cyan(),
        SecuritySeverity::Info => text.dim(),
    }
    .to_string()
}

fn scan(config: &Config, files: &[PathBuf], json: bool) -> Result<ExitCode> {
    let blocklist = config.security.blocklist()?;
    let options = config.security.scan_options();
    let threshold = config.security.block_severity;

    let mut failed = false;
    let mut results = Vec::new();

    for path in files {
        let _span = aurguard::span_parse!(path.display()).entered();
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        let recipe = match parse_recipe(&bytes) {
            Ok(recipe) => recipe,
            Err(e) => {
                failed = true;
                if json {
                    results.push(serde_json::json!({
                        "path": path,
                        "error": e.to_string(),
                    }));
                } else {
                    eprintln!("{} {}: {}", style("error:").red().bold(), path.display(), e);
                }
                continue;
            }
        };

        let pkgbuild = Pkgbuild::from_recipe(&recipe);
        let report = if config.security.enabled {
            scan_recipe(&recipe, &blocklist, &options)
        } else {
            ScanReport::default()
        };
        failed |= report.blocks(threshold);

        if json {
            results.push(serde_json::json!({
                "path": path,
                "pkgbase": pkgbuild.pkgbase,
                "version": pkgbuild.full_version_string(),
                "blocked": report.blocks(threshold),
                "findings": report.findings,
            }));
        } else {
            print_report(path, &pkgbuild, &report, threshold);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn print_report(path: &Path, pkgbuild: &Pkgbuild, report: &ScanReport, threshold: SecuritySeverity) {
    println!(
        "{} {} {}",
        style("::").bold().cyan(),
        style(&pkgbuild.pkgbase).bold(),
        style(pkgbuild.full_version_string()).green()
    );
    println!("   {}", style(path.display()).dim());

    if report.is_clean() {
        println!("{}", style(":: no blocklisted commands found.").green());
        return;
    }

    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(vec!["line", "severity", "category", "function", "command", "reason"]);
    for f in &report.findings {
        t.add_row(vec![
            f.position.line.to_string(),
            styled_severity(f.severity),
            f.category.clone(),
            f.function.clone().unwrap_or_else(|| "-".to_string()),
            f.invocation.clone(),
            f.reason.clone(),
        ]);
    }
    println!("{}", t);

    let blocking = report.count_at_least(threshold);
    if blocking > 0 {
        println!(
            "{}",
            style(format!(
                ":: {} finding(s) at or above {}; do not build this package.",
                blocking, threshold
            ))
            .red()
            .bold()
        );
    } else {
        println!(
            "{}",
            style(format!(":: {} finding(s) below {}; review before building.", report.findings.len(), threshold)).yellow()
        );
    }
}

fn show_conf(path: &Path, key: Option<&str>) -> Result<ExitCode> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let conf = PacmanConf::parse(&text).map_err(aurguard::AurguardError::from)?;

    if let Some(key) = key {
        return Ok(match conf.get(key) {
            Some(values) => {
                println!("{}", values.join(" "));
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        });
    }

    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(vec!["Directive", "Values"]);
    for key in conf.keys() {
        let values = conf.get(key).unwrap_or_default();
        t.add_row(vec![key.to_string(), values.join(" ")]);
    }
    println!("{}", t);
    println!(
        "{} {}",
        style("repositories:").bold(),
        conf.repositories().join(", ")
    );
    Ok(ExitCode::SUCCESS)
}
