//! rulemap-gen: CLI tool for generating benchmark workloads from ClassBench
//! rule sets.

use clap::{Parser, Subcommand};
use rulemap::{binary, classbench, Database, MappingGenerator};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rulemap-gen")]
#[command(version = "0.1.0")]
#[command(about = "Generate packet-classification benchmark workloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a unique packet header mapping for a ClassBench rule set
    Map {
        /// Input ClassBench rule set
        #[arg(short, long)]
        ruleset: PathBuf,

        /// Output binary workload file
        #[arg(short, long)]
        out: PathBuf,

        /// Also write the mapping as text (rule_id: field0 field1 ...)
        #[arg(short, long)]
        mapping_text: Option<PathBuf>,

        /// Total number of headers to generate
        #[arg(short, long, default_value_t = 1_000_000)]
        flows: usize,

        /// Random seed; 0 draws a seed from entropy
        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        /// Give rule #1 the highest priority value instead of the lowest
        #[arg(long)]
        reverse_priorities: bool,
    },

    /// Read a binary workload file and print its contents
    Dump {
        /// Input binary workload file
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Map {
            ruleset,
            out,
            mapping_text,
            flows,
            seed,
            reverse_priorities,
        } => generate_mapping(&ruleset, &out, mapping_text.as_deref(), flows, seed, reverse_priorities),
        Commands::Dump { input } => dump_database(&input),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn generate_mapping(
    ruleset: &std::path::Path,
    out: &std::path::Path,
    mapping_text: Option<&std::path::Path>,
    flows: usize,
    seed: u64,
    reverse_priorities: bool,
) -> rulemap::Result<()> {
    let seed = if seed == 0 {
        let drawn: u64 = rand::random();
        log::info!("randomized seed: {drawn}");
        drawn
    } else {
        seed
    };

    log::info!("reading rule set from {}", ruleset.display());
    let model = classbench::read_classbench(File::open(ruleset)?, reverse_priorities)?;
    log::info!("parsed {} rules", model.len());

    let outcome = MappingGenerator::new(seed).run(&model, flows)?;
    log::info!(
        "generated {} headers ({} unreachable rules)",
        outcome.header_count(),
        outcome.unreachable()
    );

    binary::write_file(out, &model, outcome.per_rule())?;

    if let Some(path) = mapping_text {
        log::info!("writing text mapping to {}", path.display());
        let mut writer = BufWriter::new(File::create(path)?);
        outcome.write_text(&mut writer)?;
    }

    Ok(())
}

fn dump_database(input: &std::path::Path) -> rulemap::Result<()> {
    let db = Database::open(input)?;
    println!(
        "{} rules, {} fields, {} headers",
        db.rule_count(),
        db.field_count(),
        db.header_count()
    );

    for (idx, rule) in db.rules().iter().enumerate() {
        print!("rule {idx} (priority {}):", rule.priority);
        for (low, high) in &rule.fields {
            print!(" [{low}, {high}]");
        }
        println!();
    }

    for idx in 0..db.header_count() {
        let header = db.header(idx)?;
        let rule_id = db.header_rule_id(idx)?;
        print!("header {idx} -> rule {rule_id}:");
        for value in header {
            print!(" {value}");
        }
        println!();
    }

    Ok(())
}
