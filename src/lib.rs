pub mod analyze;
pub mod cli;
pub mod descriptor;
pub mod encoding;
pub mod errors;
pub mod io_utils;
pub mod reader;
pub mod remediate;
pub mod report;
pub mod table;
pub mod validate;

use std::{collections::BTreeMap, env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    descriptor::FileDescriptor,
    reader::{ChunkedRecordReader, ReadOptions},
    remediate::Remediator,
    report::{StreamReport, TableReport},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_remedy", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Convert(args) => handle_convert(&args),
        Commands::Report(args) => handle_report(&args),
        Commands::Remediate(args) => handle_remediate(&args),
    }
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    info!(
        "Probing '{}' with delimiter '{}'",
        args.input.display(),
        printable_delimiter(io_utils::resolve_input_delimiter(
            &args.input,
            args.delimiter
        ))
    );
    let descriptor = descriptor::probe(&args.input, args.delimiter, args.sample_bytes)
        .with_context(|| format!("Probing {:?}", args.input))?;
    print!("{}", render_descriptor(&descriptor));
    if let Some(meta) = &args.meta {
        descriptor
            .save(meta)
            .with_context(|| format!("Writing descriptor to {meta:?}"))?;
        info!("Descriptor written to {meta:?}");
    }
    Ok(())
}

fn render_descriptor(descriptor: &FileDescriptor) -> String {
    let rows = vec![
        vec!["path".to_string(), descriptor.path().display().to_string()],
        vec!["format".to_string(), descriptor.format().name().to_string()],
        vec![
            "delimiter".to_string(),
            printable_delimiter(descriptor.delimiter()),
        ],
        vec![
            "encoding".to_string(),
            descriptor.encoding_label().to_string(),
        ],
        vec![
            "confidence".to_string(),
            format!("{:.2}", descriptor.confidence()),
        ],
        vec!["bytes".to_string(), descriptor.byte_size().to_string()],
        vec![
            "estimated_rows".to_string(),
            descriptor.estimated_rows().to_string(),
        ],
        vec!["columns".to_string(), descriptor.columns().join(",")],
        vec![
            "converted_path".to_string(),
            descriptor.converted_path().display().to_string(),
        ],
    ];
    report::render_table(&["property", "value"], &rows)
}

fn handle_convert(args: &cli::ConvertArgs) -> Result<()> {
    let descriptor = descriptor::probe(&args.input, args.delimiter, args.sample_bytes)
        .with_context(|| format!("Probing {:?}", args.input))?;
    let path = encoding::convert_to_utf8(&descriptor);
    println!("{}", path.display());
    Ok(())
}

fn handle_report(args: &cli::ReportArgs) -> Result<()> {
    let descriptor = descriptor::probe(&args.input, args.delimiter, args.sample_bytes)
        .with_context(|| format!("Probing {:?}", args.input))?;
    let source = resolve_source(&descriptor, args.no_convert);
    let options = ReadOptions {
        delimiter: args.delimiter,
        has_headers: !args.no_header,
        columns: args.columns.clone(),
    };
    let reader = ChunkedRecordReader::new(&descriptor, &source, options);

    match args.batch_size {
        Some(batch_size) => {
            let mut stream = reader
                .batches(batch_size)
                .with_context(|| format!("Opening batch stream over {source:?}"))?;
            let headers = stream.headers().to_vec();
            let mut summaries = Vec::new();
            let mut bad_rows = Vec::new();
            let mut missing_by_batch = BTreeMap::new();
            for batch in stream.by_ref() {
                let batch = batch?;
                summaries.push(batch.summary());
                missing_by_batch.insert(batch.index, analyze::analyze_batch(&headers, &batch));
                bad_rows.extend(batch.bad_rows);
            }
            let stream_report = StreamReport {
                batches: summaries,
                bad_rows,
                missing_by_batch,
            };
            if args.json {
                println!("{}", report::to_json(&stream_report)?);
            } else {
                println!("Batch summary");
                print!("{}", report::render_batch_summaries(&stream_report.batches));
                if !stream_report.bad_rows.is_empty() {
                    println!("\nRepaired rows");
                    print!("{}", report::render_bad_rows(&stream_report.bad_rows));
                }
                println!("\nMissing values per batch");
                print!(
                    "{}",
                    report::render_batch_missingness(&stream_report.missing_by_batch)
                );
            }
            info!(
                "Reported {} batch(es) from {:?}",
                stream_report.batches.len(),
                source
            );
        }
        None => {
            let (table, bad_rows) = reader
                .read_table()
                .with_context(|| format!("Reading {source:?}"))?;
            let table_report = TableReport {
                row_count: table.row_count(),
                column_count: table.column_count(),
                bad_rows,
                missing: analyze::analyze_table(&table),
            };
            if args.json {
                println!("{}", report::to_json(&table_report)?);
            } else {
                println!(
                    "{} row(s), {} column(s)",
                    table_report.row_count, table_report.column_count
                );
                if !table_report.bad_rows.is_empty() {
                    println!("\nRepaired rows");
                    print!("{}", report::render_bad_rows(&table_report.bad_rows));
                }
                println!("\nMissing values");
                if table_report.missing.is_empty() {
                    println!("no missing values");
                } else {
                    print!("{}", report::render_missingness(&table_report.missing));
                }
            }
            info!(
                "Reported {} column(s) with missing values from {:?}",
                table_report.missing.len(),
                source
            );
        }
    }
    Ok(())
}

fn handle_remediate(args: &cli::RemediateArgs) -> Result<()> {
    let descriptor = descriptor::probe(&args.input, args.delimiter, args.sample_bytes)
        .with_context(|| format!("Probing {:?}", args.input))?;
    let source = resolve_source(&descriptor, args.no_convert);
    let options = ReadOptions {
        delimiter: args.delimiter,
        has_headers: true,
        columns: Vec::new(),
    };
    let reader = ChunkedRecordReader::new(&descriptor, &source, options);
    let (table, _bad_rows) = reader
        .read_table()
        .with_context(|| format!("Reading {source:?}"))?;

    let mut remediator = Remediator::new(table);
    remediator
        .handle(&args.method, args.fill_with.as_deref(), &args.columns)
        .with_context(|| format!("Applying remediation '{}'", args.method))?;

    let (table, audit) = remediator.into_parts();
    let delimiter = io_utils::resolve_input_delimiter(&args.output, args.delimiter);
    table
        .write_csv(&args.output, delimiter)
        .with_context(|| format!("Writing remediated output to {:?}", args.output))?;

    println!("Remediation audit");
    print!("{}", report::render_audit(audit.entries()));
    info!(
        "Remediated {:?} -> {:?} ({} row(s) written)",
        args.input,
        args.output,
        table.row_count()
    );
    Ok(())
}

fn resolve_source(descriptor: &FileDescriptor, no_convert: bool) -> PathBuf {
    if no_convert {
        descriptor.path().to_path_buf()
    } else {
        encoding::convert_to_utf8(descriptor)
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
