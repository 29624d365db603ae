// pmscan/src/main.rs

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;

use pmio::prelude::*;
use pmscheme::kinds::GuidTypeKind;
use pmscheme::{PartitionTable, SchemeKind, apple, guid, scan_any};

#[derive(Parser)]
#[command(name = "pmscan", version, about = "Partition-table scanner", long_about = None)]
struct Cli {
    /// Disk image to scan
    image: PathBuf,

    /// Logical block size of the imaged device
    #[arg(short, long, default_value_t = 512)]
    block_size: u64,

    /// Scheme to probe
    #[arg(short, long, value_enum, default_value = "auto")]
    scheme: Scheme,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Scheme {
    /// Try the GUID table first, then the Apple map
    Auto,
    Guid,
    Apple,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut file = File::open(&cli.image)
        .with_context(|| format!("cannot open image {}", cli.image.display()))?;
    let total_size = file
        .metadata()
        .with_context(|| format!("cannot stat image {}", cli.image.display()))?
        .len();

    let mut medium = FileMedium::new(&mut file, cli.block_size, total_size);

    let result = match cli.scheme {
        Scheme::Auto => scan_any(&mut medium),
        Scheme::Guid => guid::scan(&mut medium),
        Scheme::Apple => apple::scan(&mut medium),
    };

    match result {
        Ok(table) => {
            render(&table, cli.block_size, total_size);
            Ok(())
        }
        Err(e) if e.is_mismatch() => {
            bail!("no recognized partition table: {e}")
        }
        Err(e) => bail!("scan aborted: {e}"),
    }
}

fn render(table: &PartitionTable, block_size: u64, total_size: u64) {
    println!(
        "{} • block: {} • size: {}",
        table.scheme.to_string().bold().green(),
        sep_u64(block_size),
        pretty_bytes(total_size),
    );
    if let Some(guid) = &table.disk_guid {
        println!("disk GUID: {}", guid.cyan());
    }
    if table.driver_descriptor {
        println!("driver descriptor present");
    }

    println!(
        "  ┌─────┬──────────────────────────────┬──────────────────────────────┬───────────────┬───────────────┬────┐"
    );
    println!(
        "  | Loc | Name                         | Type                         | Base          | Size          | RW |"
    );
    println!(
        "  ├─────┼──────────────────────────────┼──────────────────────────────┼───────────────┼───────────────┼────┤"
    );

    for p in &table.partitions {
        let type_display = match table.scheme {
            SchemeKind::Guid => match GuidTypeKind::from_hint(&p.type_hint) {
                GuidTypeKind::Unknown(_) => p.type_hint.clone(),
                kind => kind.to_string(),
            },
            SchemeKind::Apple => p.type_hint.clone(),
        };

        println!(
            "  | {:<3} | {:<28} | {:<28} | {:>13} | {:>13} | {:<2} |",
            p.location(),
            truncate(&p.name, 28),
            truncate(&type_display, 28),
            sep_u64(p.base),
            pretty_bytes(p.size),
            if p.writable { "rw" } else { "ro" },
        );
    }

    println!(
        "  └─────┴──────────────────────────────┴──────────────────────────────┴───────────────┴───────────────┴────┘"
    );
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn pretty_bytes(n: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut val = n as f64;
    let mut idx = 0usize;
    while val >= 1024.0 && idx + 1 < UNITS.len() {
        val /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{} {}", sep_u64(n), UNITS[idx])
    } else {
        format!("{:.1} {}", val, UNITS[idx])
    }
}

fn sep_u64(mut n: u64) -> String {
    if n < 1_000 {
        return n.to_string();
    }
    let mut parts: Vec<String> = Vec::new();
    while n >= 1_000 {
        parts.push(format!("{:03}", n % 1_000));
        n /= 1_000;
    }
    parts.push(n.to_string());
    parts.reverse();
    parts.join(" ")
}
