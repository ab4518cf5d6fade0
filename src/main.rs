//! SAR CLI - Command-line tool for inspecting and extracting SAR packages.
//!
//! This is the main entry point for the `sar` command-line application.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sar::prelude::*;

/// SAR - package archive inspection tool
#[derive(Parser)]
#[command(name = "sar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SAR package
    #[arg(short, long, env = "SAR_INPUT")]
    input: PathBuf,

    /// Memory-map the package instead of reading through a file handle
    #[arg(long)]
    mmap: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the package header
    Info {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the build version major
    Version,

    /// Print the build changelist
    Changelist,

    /// List files in on-disk table order
    List {
        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show sizes, modification times and checksums
        #[arg(short, long)]
        detailed: bool,
    },

    /// Print compressed and uncompressed totals per file type
    Stats,

    /// Extract files to a directory
    Extract {
        /// Output directory
        #[arg(short, long, env = "SAR_OUTPUT")]
        output: PathBuf,

        /// Extract a single file (path relative to the package root)
        #[arg(long, conflicts_with = "filter")]
        file: Option<String>,

        /// Filter pattern (glob-style, case-insensitive)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// List a directory inside the package
    Ls {
        /// Directory relative to the package root, or a `content://` / `config://` path
        #[arg(default_value = "")]
        directory: String,

        /// Include files in subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Only list files with this extension
        #[arg(short, long)]
        extension: Option<String>,
    },

    /// Verify CRC32 checksums
    Verify {
        /// Report the result of every file
        #[arg(long)]
        report: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let package = open_package(&cli.input, cli.mmap)?;

    match cli.command {
        Commands::Info { json } => cmd_info(&package, json)?,
        Commands::Version => println!("{}", package.build_version_major()),
        Commands::Changelist => println!("{}", package.build_changelist()),
        Commands::List { filter, detailed } => cmd_list(&package, filter.as_deref(), detailed)?,
        Commands::Stats => cmd_stats(&package),
        Commands::Extract {
            output,
            file,
            filter,
        } => cmd_extract(&package, &output, file.as_deref(), filter.as_deref())?,
        Commands::Ls {
            directory,
            recursive,
            extension,
        } => cmd_ls(&package, &directory, recursive, extension.as_deref())?,
        Commands::Verify { report } => {
            if !cmd_verify(&package, report) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_package(path: &Path, mmap: bool) -> Result<PackageFileSystem> {
    let start = Instant::now();
    let package = PackageFileSystem::new(path, PackageOptions::new().memory_mapped(mmap));
    if let Some(reason) = package.load_error() {
        bail!("Failed to load package {}: {reason}", path.display());
    }
    tracing::debug!(entries = package.entry_count(), elapsed = ?start.elapsed(), "opened package");
    Ok(package)
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Case-insensitive glob over relative paths.
fn compile_filter(filter: Option<&str>) -> Result<Option<Pattern>> {
    filter
        .map(|f| Pattern::new(f).with_context(|| format!("Invalid filter pattern {f:?}")))
        .transpose()
}

fn matches_filter(pattern: Option<&Pattern>, path: &GamePath) -> bool {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    pattern.map_or(true, |p| p.matches_with(path.relative(), options))
}

#[derive(Serialize)]
struct Info<'a> {
    name: &'a str,
    header: &'a PackageHeader,
    entries: usize,
    has_post_crc32: bool,
    compression_dict: Option<String>,
}

fn cmd_info(package: &PackageFileSystem, json: bool) -> Result<()> {
    let header = package.header().context("Package has no header")?;

    if json {
        let info = Info {
            name: package.name(),
            header,
            entries: package.entry_count(),
            has_post_crc32: package.has_post_crc32(),
            compression_dict: package.compression_dict_path().map(ToString::to_string),
        };
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Package:            {}", package.name());
    println!("Version:            {}", header.version);
    println!("Platform:           {}", header.platform);
    println!("Game directory:     {}", header.game_directory.scheme());
    println!("Build version:      {}", header.build_version_major);
    println!("Build changelist:   {}", header.build_changelist);
    println!("Variation:          {}", header.package_variation);
    println!("Entries:            {}", header.total_entries);
    println!("Obfuscated:         {}", header.obfuscated);
    println!("Compressed table:   {}", header.compressed_file_table);
    println!("Directory queries:  {}", header.supports_directory_queries);
    println!("Post-cook CRC32:    {}", package.has_post_crc32());
    println!("Byte swapped:       {}", header.byte_swapped);
    println!("Table offset:       {}", header.offset_to_file_table);
    println!("Table size:         {}", header.file_table_size);
    println!("Package size:       {}", header.total_package_size);
    if let Some(path) = package.compression_dict_path() {
        println!("Compression dict:   {path}");
    }

    Ok(())
}

fn cmd_list(package: &PackageFileSystem, filter: Option<&str>, detailed: bool) -> Result<()> {
    let pattern = compile_filter(filter)?;

    let mut count = 0;
    for (path, table_entry) in package.file_table() {
        if !matches_filter(pattern.as_ref(), &path) {
            continue;
        }

        if detailed {
            let entry = table_entry.entry;
            println!(
                "{:>12} {:>12} {:>12} {:08x} {:08x} {} {}",
                entry.offset_to_file,
                entry.compressed_size,
                entry.uncompressed_size,
                entry.crc32_pre,
                entry.crc32_post,
                entry.modified_time,
                path.relative()
            );
        } else {
            println!("{}", path.relative());
        }
        count += 1;
    }

    println!("\nTotal: {} entries", count);

    Ok(())
}

#[derive(Default)]
struct TypeTotals {
    files: usize,
    compressed: u64,
    uncompressed: u64,
}

fn cmd_stats(package: &PackageFileSystem) {
    let mut totals: BTreeMap<FileType, TypeTotals> = BTreeMap::new();
    for (path, table_entry) in package.file_table() {
        let totals = totals.entry(path.file_type()).or_default();
        totals.files += 1;
        totals.compressed += table_entry.entry.compressed_size;
        totals.uncompressed += table_entry.entry.uncompressed_size;
    }

    println!("{:<16} {:>8} {:>14} {:>14}", "Type", "Files", "Stored", "Uncompressed");
    let mut sum = TypeTotals::default();
    for (file_type, t) in &totals {
        println!(
            "{:<16} {:>8} {:>14} {:>14}",
            format!("{file_type:?}"),
            t.files,
            t.compressed,
            t.uncompressed
        );
        sum.files += t.files;
        sum.compressed += t.compressed;
        sum.uncompressed += t.uncompressed;
    }
    println!(
        "{:<16} {:>8} {:>14} {:>14}",
        "Total", sum.files, sum.compressed, sum.uncompressed
    );
}

fn write_output(output: &Path, path: &GamePath, data: &[u8]) -> Result<()> {
    let output_path = output.join(path.relative().replace('/', std::path::MAIN_SEPARATOR_STR));
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output_path, data)
        .with_context(|| format!("Failed to write {}", output_path.display()))
}

fn cmd_extract(
    package: &PackageFileSystem,
    output: &Path,
    file: Option<&str>,
    filter: Option<&str>,
) -> Result<()> {
    fs::create_dir_all(output)?;

    if let Some(file) = file {
        let directory = package.game_directory().context("Package has no game directory")?;
        let path = GamePath::new(directory, file);
        let data = package
            .read_file(&path)
            .with_context(|| format!("Failed to read {path}"))?;
        write_output(output, &path, &data)?;
        println!("Extracted {path} ({} bytes)", data.len());
        return Ok(());
    }

    let pattern = compile_filter(filter)?;
    let paths: Vec<GamePath> = package
        .file_table()
        .into_iter()
        .map(|(path, _)| path)
        .filter(|path| matches_filter(pattern.as_ref(), path))
        .collect();

    println!("Extracting {} entries...", paths.len());

    let pb = progress_bar(paths.len() as u64)?;
    let start = Instant::now();
    let mut errors = 0;

    for chunk in paths.chunks(256) {
        let results = package.read_files_parallel(chunk);
        for (path, result) in chunk.iter().zip(results) {
            match result {
                Ok(data) => write_output(output, path, &data)?,
                Err(e) => {
                    pb.suspend(|| eprintln!("Error extracting {path}: {e}"));
                    errors += 1;
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_with_message("Done");
    println!(
        "Extraction completed in {:?} ({} errors)",
        start.elapsed(),
        errors
    );

    Ok(())
}

fn cmd_ls(
    package: &PackageFileSystem,
    directory: &str,
    recursive: bool,
    extension: Option<&str>,
) -> Result<()> {
    let directory = if directory.contains("://") {
        directory
            .parse::<GamePath>()
            .with_context(|| format!("Invalid directory {directory:?}"))?
    } else {
        let game_directory = package.game_directory().context("Package has no game directory")?;
        GamePath::new(game_directory, directory)
    };

    let listing = package
        .directory_listing(&directory, recursive, extension)
        .with_context(|| format!("Failed to list {directory}"))?;
    for path in &listing {
        println!("{path}");
    }

    Ok(())
}

fn cmd_verify(package: &PackageFileSystem, report: bool) -> bool {
    let start = Instant::now();

    if !report {
        let ok = package.verify_crc32();
        println!(
            "CRC32 check {} in {:?}",
            if ok { "passed" } else { "FAILED" },
            start.elapsed()
        );
        return ok;
    }

    let mut entries = Vec::new();
    let ok = package.verify_crc32_entries(&mut entries);
    for e in &entries {
        println!(
            "{} {}",
            if e.crc32_ok { "ok  " } else { "FAIL" },
            e.path.relative()
        );
    }

    let failed = entries.iter().filter(|e| !e.crc32_ok).count();
    println!(
        "\n{} files checked, {} failed in {:?}",
        entries.len(),
        failed,
        start.elapsed()
    );
    ok
}
