use anyhow::Context;
use colored::Colorize;
use serde::Serialize;
use vest_ledger::{math, LedgerConfig, Stream};
use vest_types::{Address, Amount, StreamId};

use crate::cli::*;
use crate::scenario::{self, Scenario, SimulationReport};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Simulate(args) => cmd_simulate(args, cli.format, cli.verbose),
        Command::Preview(args) => cmd_preview(args, cli.format),
    }
}

fn cmd_simulate(args: SimulateArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(&args.scenario)?;
    let config = args
        .config
        .as_deref()
        .map(LedgerConfig::from_file)
        .transpose()
        .context("loading ledger config")?;
    let report = scenario::run(&scenario, config, verbose)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    if !report.is_valid() {
        anyhow::bail!("{} invariant violation(s)", report.violations.len());
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    if let Some(name) = &report.name {
        println!("Scenario {}", name.bold());
    }
    for event in &report.setup_events {
        println!("  {} {}", "event".dimmed(), event);
    }
    for step in &report.steps {
        let at = format!("+{}s", step.at);
        match (&step.output, &step.error) {
            (_, Some(error)) => println!(
                "{:>3} {:>7} {} {}: {}",
                step.index,
                at.dimmed(),
                "✗".red().bold(),
                step.action,
                error.red()
            ),
            (output, None) => println!(
                "{:>3} {:>7} {} {}: {}",
                step.index,
                at.dimmed(),
                "✓".green().bold(),
                step.action,
                output.as_deref().unwrap_or_default()
            ),
        }
        for event in &step.events {
            println!("            {} {}", "event".dimmed(), event);
        }
    }

    println!("\nActive streams: {}", report.streams.len().to_string().bold());
    for stream in &report.streams {
        println!(
            "  {} remaining {} of {} over [{}, {})",
            stream.id.to_string().yellow(),
            stream.remaining_balance,
            stream.deposit,
            stream.start_time,
            stream.stop_time
        );
    }
    println!("Holdings:");
    for holding in &report.holdings {
        println!("  {:<12} {:<8} {}", holding.account, holding.token.cyan(), holding.amount);
    }

    if report.is_valid() {
        println!("{} Invariants hold.", "✓".green().bold());
    } else {
        for violation in &report.violations {
            println!("{} {}", "✗".red().bold(), violation);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Preview {
    rate_per_second: Amount,
    remainder: Amount,
    delta: u64,
    recipient_balance: Amount,
    sender_balance: Amount,
    settles: bool,
}

fn cmd_preview(args: PreviewArgs, format: OutputFormat) -> anyhow::Result<()> {
    let rate = math::rate_per_second(args.deposit, args.start, args.stop)?;
    let remaining_balance = args
        .deposit
        .checked_sub(args.withdrawn)
        .context("withdrawn amount exceeds the deposit")?;
    let stream = Stream {
        id: StreamId::new(1),
        sender: Address::derive("preview-sender"),
        recipient: Address::derive("preview-recipient"),
        deposit: args.deposit,
        token_address: Address::derive("preview-token"),
        start_time: args.start,
        stop_time: args.stop,
        remaining_balance,
        rate_per_second: rate,
        nft_token_id: None,
    };
    let delta = math::delta_of(args.start, args.stop, args.at);
    let balances = math::apportion(&stream, args.at)?;
    let settles = math::is_exhausted(&stream, args.at)?;

    match format {
        OutputFormat::Json => {
            let preview = Preview {
                rate_per_second: rate,
                remainder: stream.remainder(),
                delta,
                recipient_balance: balances.recipient,
                sender_balance: balances.sender,
                settles,
            };
            println!("{}", serde_json::to_string_pretty(&preview)?);
        }
        OutputFormat::Text => {
            println!("Rate:       {} per second", rate.to_string().bold());
            println!("Remainder:  {}", stream.remainder());
            println!("Elapsed:    {}s of {}s", delta, stream.duration());
            println!("Recipient:  {}", balances.recipient.to_string().green());
            println!("Sender:     {}", balances.sender.to_string().yellow());
            if settles {
                println!("{} Stream would settle at this instant.", "✓".green().bold());
            }
        }
    }
    Ok(())
}
