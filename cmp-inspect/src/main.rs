use clap::{Parser, Subcommand, ValueEnum};
use cmp_storage::{sanity, BitConfig, BitOrder, CmpReader};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "cmp-inspect",
    about = "Inspector for CMP compressed-segment containers",
    version,
    long_about = "Opens CMP container files, reports their detected layout \
                  (byte order, offset-table base, segment grid) and decodes \
                  segment bitstreams for inspection."
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderArg {
    Msb,
    Lsb,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected header layout
    Info {
        /// Base CMP file
        path: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List the non-empty segment coordinates
    Segments {
        /// Base CMP file
        path: PathBuf,
    },

    /// Parse one segment and run the sanity checks
    Analyze {
        /// Base CMP file
        path: PathBuf,

        /// Segment coordinate (defaults to the first non-empty one)
        #[arg(short, long, num_args = 3, value_names = ["S1", "S2", "S3"], allow_negative_numbers = true)]
        segment: Option<Vec<i32>>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Decode and print the first symbols of a segment's bitstream
    Symbols {
        /// Base CMP file
        path: PathBuf,

        /// Segment coordinate (defaults to the first non-empty one)
        #[arg(short, long, num_args = 3, value_names = ["S1", "S2", "S3"], allow_negative_numbers = true)]
        segment: Option<Vec<i32>>,

        /// How many symbols to decode
        #[arg(short, long, default_value_t = 64)]
        count: usize,

        /// Bit order within each payload byte
        #[arg(long, value_enum, default_value = "msb")]
        order: OrderArg,

        /// Invert every bit
        #[arg(long)]
        invert: bool,

        /// Skip this many bits before the first symbol (0..=7)
        #[arg(long, default_value_t = 0)]
        shift: u8,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn run(command: Commands) -> CliResult {
    match command {
        Commands::Info { path, format } => info(&path, format),
        Commands::Segments { path } => segments(&path),
        Commands::Analyze {
            path,
            segment,
            format,
        } => analyze(&path, segment, format),
        Commands::Symbols {
            path,
            segment,
            count,
            order,
            invert,
            shift,
        } => symbols(&path, segment, count, order, invert, shift),
    }
}

#[derive(Serialize)]
struct InfoReport {
    path: String,
    byte_order: String,
    extents: usize,
    total_size: u64,
    ot_pos: u64,
    table_base: u64,
    lead_in: bool,
    hdr_pos: u64,
    rec_pos_0: u64,
    rec_pos_1: u64,
    dimensions: [(i32, i32); 3],
    segments: usize,
    non_empty: usize,
}

fn info(path: &PathBuf, format: OutputFormat) -> CliResult {
    let reader = CmpReader::open(path)?;
    let offsets = reader.header_offsets();
    let (d1, d2, d3) = reader.dimensions();
    let report = InfoReport {
        path: path.display().to_string(),
        byte_order: reader.byte_order().to_string(),
        extents: reader.extents().extent_count(),
        total_size: reader.extents().total_size(),
        ot_pos: offsets.ot_pos,
        table_base: offsets.table_base,
        lead_in: offsets.table_base != offsets.ot_pos,
        hdr_pos: offsets.hdr_pos,
        rec_pos_0: offsets.rec_pos_0,
        rec_pos_1: offsets.rec_pos_1,
        dimensions: [d1, d2, d3],
        segments: reader.offset_table().len(),
        non_empty: reader.list_non_empty_segments().len(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!("{}", report.path);
            println!("  byte order : {}", report.byte_order);
            println!(
                "  extents    : {} ({} bytes total)",
                report.extents, report.total_size
            );
            println!(
                "  layout     : table @ {}{}, data header @ {}, records @ {}..{}",
                report.table_base,
                if report.lead_in { " (lead-in)" } else { "" },
                report.hdr_pos,
                report.rec_pos_0,
                report.rec_pos_1
            );
            println!(
                "  grid       : [{}..{}] x [{}..{}] x [{}..{}] = {} segments, {} non-empty",
                d1.0, d1.1, d2.0, d2.1, d3.0, d3.1, report.segments, report.non_empty
            );
        }
    }
    Ok(())
}

fn segments(path: &PathBuf) -> CliResult {
    let reader = CmpReader::open(path)?;
    for (s1, s2, s3) in reader.list_non_empty_segments() {
        println!("{s1} {s2} {s3}");
    }
    Ok(())
}

fn pick_segment(reader: &CmpReader, segment: Option<Vec<i32>>) -> Result<(i32, i32, i32), String> {
    match segment {
        Some(coord) => Ok((coord[0], coord[1], coord[2])),
        None => reader
            .find_first_non_empty()
            .ok_or_else(|| "no non-empty segments in the offset table".to_string()),
    }
}

#[derive(Serialize)]
struct AnalyzeReport {
    segment: (i32, i32, i32),
    record_offset: u64,
    table_base: usize,
    symbol_count: usize,
    max_code_len: u8,
    non_zero_lengths: usize,
    payload_start: usize,
    metadata_bits: u64,
    required_bits: u64,
    assembled_bytes: usize,
    truncated: bool,
    probe_configs: Vec<String>,
    sanity: Vec<SanityLine>,
}

#[derive(Serialize)]
struct SanityLine {
    name: &'static str,
    passed: bool,
    detail: String,
}

fn analyze(path: &PathBuf, segment: Option<Vec<i32>>, format: OutputFormat) -> CliResult {
    let reader = CmpReader::open(path)?;
    let (s1, s2, s3) = pick_segment(&reader, segment)?;
    let record = reader.read_segment(s1, s2, s3)?;
    let assembled = reader.assemble_payload(&record)?;
    let report = AnalyzeReport {
        segment: (s1, s2, s3),
        record_offset: record.start_offset,
        table_base: record.huffman.base,
        symbol_count: record.huffman.n(),
        max_code_len: record.huffman.max_len,
        non_zero_lengths: record.huffman.non_zero,
        payload_start: record.payload_start_byte,
        metadata_bits: record.metadata.total_bits(),
        required_bits: record.required_bits,
        assembled_bytes: assembled.bytes.len(),
        truncated: assembled.truncated,
        probe_configs: record
            .probe_configs
            .iter()
            .map(|c| c.to_string())
            .collect(),
        sanity: sanity::run(&reader)
            .checks
            .into_iter()
            .map(|c| SanityLine {
                name: c.name,
                passed: c.passed,
                detail: c.detail,
            })
            .collect(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            println!(
                "segment ({}, {}, {}) @ {}",
                s1, s2, s3, report.record_offset
            );
            println!(
                "  table      : base {} N {} maxLen {} ({} non-zero)",
                report.table_base,
                report.symbol_count,
                report.max_code_len,
                report.non_zero_lengths
            );
            println!(
                "  payload    : starts {} requires {} bits (metadata declares {})",
                report.payload_start, report.required_bits, report.metadata_bits
            );
            println!(
                "  assembled  : {} bytes{}",
                report.assembled_bytes,
                if report.truncated { " (truncated)" } else { "" }
            );
            println!("  bit configs: {}", report.probe_configs.join(", "));
            for line in &report.sanity {
                println!(
                    "  sanity {:18} {} {}",
                    line.name,
                    if line.passed { "ok  " } else { "FAIL" },
                    line.detail
                );
            }
        }
    }
    Ok(())
}

fn symbols(
    path: &PathBuf,
    segment: Option<Vec<i32>>,
    count: usize,
    order: OrderArg,
    invert: bool,
    shift: u8,
) -> CliResult {
    let reader = CmpReader::open(path)?;
    let (s1, s2, s3) = pick_segment(&reader, segment)?;
    let record = reader.read_segment(s1, s2, s3)?;
    let assembled = reader.assemble_payload(&record)?;

    let config = BitConfig {
        order: match order {
            OrderArg::Msb => BitOrder::MsbFirst,
            OrderArg::Lsb => BitOrder::LsbFirst,
        },
        invert,
        shift: shift.min(7),
    };
    let stream = reader.decode_symbols(&record, &assembled, config)?;

    let mut printed = 0;
    for symbol in stream.take(count) {
        let symbol = symbol?;
        print!("{symbol}");
        printed += 1;
        if printed % 16 == 0 {
            println!();
        } else {
            print!(" ");
        }
    }
    if printed % 16 != 0 {
        println!();
    }
    Ok(())
}
