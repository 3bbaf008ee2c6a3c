use clap::{Args, Parser, Subcommand};
use std::{
    fs,
    path::{Path, PathBuf},
    process,
};
use taphold_config::{
    compiler::TapHoldConfig,
    keycodes, pretty_compile,
    replay::{self, MAX_BINDINGS},
};
use taphold_engine::config_loader;

use anyhow::{anyhow, Result};

/// Compile and exercise tap-hold configurations
#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List keycode names
    KeycodesList(ListKeycodesArgs),
    /// Validate a tap-hold configuration file
    Validate(ValidateArgs),
    /// Print the binary form of a configuration file
    Compile(CompileArgs),
    /// Run a script of key events through the resolver and print the resulting reports
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ListKeycodesArgs {
    /// Include the keycode hex value
    #[clap(long, short)]
    verbose: bool,

    /// Sort results by keycode; Defaults to sorting by name
    #[clap(long, short)]
    sort_by_keycode: bool,

    /// Only list key names that contain pattern (case insensitive). If pattern starts with 0x then
    /// key names matching the key code will be shown.
    #[clap()]
    pattern: Option<String>,
}

#[derive(Args)]
struct ValidateArgs {
    /// Display information about the configuration file
    #[clap(long, short)]
    verbose: bool,

    /// tap-hold config file
    file: PathBuf,
}

#[derive(Args)]
struct CompileArgs {
    /// tap-hold config file
    file: PathBuf,
}

#[derive(Args)]
struct ReplayArgs {
    /// tap-hold config file
    config: PathBuf,

    /// key event script; one `<time> down|up|reset|reset_all|tick [key]` per line
    events: PathBuf,
}

fn read_file(file: &Path) -> Result<String> {
    fs::read_to_string(file).map_err(|err| {
        anyhow!(
            "Failed to read \"{}\"!\n    {}",
            file.display(),
            err
        )
    })
}

fn compile_file(file: &Path, src: &str) -> Result<TapHoldConfig> {
    pretty_compile(file, src).map_err(|err| {
        if err.span.is_none() {
            anyhow!("{err}")
        } else {
            anyhow!("Failed to compile \"{}\"", file.display())
        }
    })
}

fn validate(args: &ValidateArgs) -> Result<()> {
    let file = &args.file;
    let src = read_file(file)?;
    let conf = compile_file(file, &src)?;
    let bin = conf.serialize();

    let resolver = config_loader::load::<MAX_BINDINGS>(bin.iter().copied())
        .map_err(|err| anyhow!("Config rejected by the engine: {err:?}"))?;

    if args.verbose {
        let policy = resolver.policy();
        println!("binary size:     {}", bin.len() * 2);
        println!("bindings:        {}", resolver.len());
        println!("tapping_term:    {}", policy.tapping_term);
        println!("permissive_hold: {}", policy.permissive_hold);
        for b in conf.bindings() {
            println!(
                "  {}: tap {} hold {}",
                b.index,
                key_label(b.tap),
                key_label(b.hold)
            );
        }
    }
    Ok(())
}

fn compile(args: &CompileArgs) -> Result<()> {
    let src = read_file(&args.file)?;
    let conf = compile_file(&args.file, &src)?;
    let words = conf
        .serialize()
        .iter()
        .map(|w| format!("0x{w:04x}"))
        .collect::<Vec<_>>();
    println!("{}", words.join(" "));
    Ok(())
}

fn replay_reports(args: &ReplayArgs) -> Result<Vec<String>> {
    let src = read_file(&args.config)?;
    let conf = compile_file(&args.config, &src)?;

    let script = read_file(&args.events)?;
    let reports = replay::parse_script(&script)
        .and_then(|steps| replay::replay(&conf, &steps))
        .map_err(|err| {
            err.eprint(&args.events, &script);
            anyhow!("Replay of \"{}\" failed: {}", args.events.display(), err.message)
        })?;

    Ok(reports
        .iter()
        .map(|(time, report)| format!("{time:>6} {}", replay::format_report(report)))
        .collect())
}

fn run_replay(args: &ReplayArgs) -> Result<()> {
    for line in replay_reports(args)? {
        println!("{line}");
    }
    Ok(())
}

fn key_label(code: u16) -> String {
    keycodes::key_name(code)
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("0x{code:02x}"))
}

fn list_keycodes(args: &ListKeycodesArgs) -> Result<()> {
    let iter = keycodes::keycodes_iter();
    let mut codes = if let Some(pattern) = &args.pattern {
        let pattern = pattern.to_lowercase();
        if let Some(hex) = pattern.strip_prefix("0x") {
            let pattern = u16::from_str_radix(hex, 16)?;
            iter.filter(|p| p.code == pattern).collect::<Vec<_>>()
        } else {
            let pattern = pattern.as_str();
            iter.filter(|p| p.name.to_lowercase().contains(pattern))
                .collect::<Vec<_>>()
        }
    } else {
        iter.collect::<Vec<_>>()
    };
    if args.sort_by_keycode {
        codes.sort_by(|a, b| a.code.cmp(&b.code).then(a.name.cmp(b.name)));
    } else {
        codes.sort_by_key(|k| k.name);
    }
    for d in codes {
        if args.verbose {
            println!("{:02X}: {}", d.code, d.name);
        } else {
            println!("{}", d.name);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = run(&cli);

    if let Err(message) = result {
        eprintln!("{message}");
        process::exit(1);
    };
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::KeycodesList(args) => list_keycodes(args),
        Commands::Validate(args) => validate(args),
        Commands::Compile(args) => compile(args),
        Commands::Replay(args) => run_replay(args),
    }
}
