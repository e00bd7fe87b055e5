//! chpsim: discrete-event simulator for CHP process networks

use std::env;

use anyhow::{anyhow, bail, Context};
use chpsim::config::Config;
use chpsim::interpreter::EngineStatus;
use chpsim::testing::Scenario;

const DEFAULT_MAX_EVENTS: u64 = 100_000;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    match command {
        "scenario" | "run" => {
            let name = args
                .get(2)
                .filter(|a| !a.starts_with('-'))
                .ok_or_else(|| anyhow!("usage: chpsim scenario <name> [--dump-state] [--max-events N]"))?;
            let scenario: Scenario = name.parse().map_err(|e: String| anyhow!(e))?;
            let opts = Options::parse(&args[3..])?;
            run_scenario(scenario, &opts)
        }
        "all" => {
            let opts = Options::parse(&args[2..])?;
            for scenario in Scenario::ALL {
                run_scenario(scenario, &opts)?;
                println!();
            }
            Ok(())
        }
        "list" => {
            for scenario in Scenario::ALL {
                println!("{:<18} {}", scenario.name(), scenario.description());
            }
            Ok(())
        }
        "config" => {
            match Config::user_config_path() {
                Some(path) => println!("# User config path: {}", path.display()),
                None => println!("# No user config directory on this platform"),
            }
            print!("{}", Config::sample_config());
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            print_usage();
            bail!("unknown command `{}`", other)
        }
    }
}

struct Options {
    dump_state: bool,
    max_events: u64,
}

impl Options {
    fn parse(args: &[String]) -> anyhow::Result<Self> {
        let mut opts = Options {
            dump_state: false,
            max_events: DEFAULT_MAX_EVENTS,
        };
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--dump-state" => opts.dump_state = true,
                "--max-events" => {
                    let n = iter.next().ok_or_else(|| anyhow!("--max-events needs a value"))?;
                    opts.max_events = n
                        .parse()
                        .with_context(|| format!("invalid --max-events value `{}`", n))?;
                }
                other => bail!("unknown option `{}`", other),
            }
        }
        Ok(opts)
    }
}

fn run_scenario(scenario: Scenario, opts: &Options) -> anyhow::Result<()> {
    println!("Scenario: {} ({})", scenario.name(), scenario.description());
    println!("========");

    let mut run = scenario.build(Config::get().clone())?;
    let delivered = run
        .engine
        .run(opts.max_events)
        .with_context(|| format!("scenario {} failed at time {}", scenario, run.engine.now()))?;

    for line in run.engine.log().lines() {
        println!("{}", line);
    }
    println!();
    println!(
        "{} events, final time {}, status {}",
        delivered,
        run.engine.now(),
        run.engine.status_string()
    );
    print!("{}", run.report());

    let warnings = run.engine.diagnostics().warnings();
    if !warnings.is_empty() {
        println!("{} warning(s):", warnings.len());
        for w in warnings {
            println!("  {}", w);
        }
    }

    if opts.dump_state || run.engine.status() == EngineStatus::Idle {
        println!();
        print!("{}", run.engine.dump_state());
    }
    Ok(())
}

fn print_usage() {
    println!("chpsim - discrete-event simulator for CHP process networks");
    println!();
    println!("Usage:");
    println!("  chpsim scenario <name> [--dump-state] [--max-events N]");
    println!("  chpsim all [--dump-state] [--max-events N]");
    println!("  chpsim list");
    println!("  chpsim config");
    println!();
    println!("Scenarios:");
    for scenario in Scenario::ALL {
        println!("  {}", scenario.name());
    }
    println!();
    println!("Set RUST_LOG=debug (or trace) for engine tracing.");
}
