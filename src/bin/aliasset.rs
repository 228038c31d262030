use std::{fs::File, path::PathBuf, process::ExitCode};

use aliasset::*;
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    log: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,

    /// Print every pair of pointers found to alias
    #[arg(long)]
    pairwise: bool,
    /// Print the alias sets
    #[arg(long = "print-as")]
    print_as: bool,
    /// Match call arguments and return values across functions
    #[arg(short, long)]
    interprocedural: bool,

    input: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(log) = args.log {
        let log_file = match File::create(&log) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("cannot create {}: {}", log.display(), e);
                return ExitCode::FAILURE;
            }
        };
        let level = if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(log_file)
            .init();
    }

    let conf = alias_set::Config {
        verbose_pairwise: args.pairwise,
        dump_partition: args.print_as,
        interprocedural: args.interprocedural,
    };
    match alias_set::analyze_path(&args.input, &conf) {
        Ok(res) => {
            println!("{}", res.stats);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", args.input.display(), e);
            ExitCode::FAILURE
        }
    }
}
