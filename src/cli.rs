// Command-line front end for oxipbf.
//
// Subcommands:
//   info: print the file header and per-kind element counts
//   cat: re-encode a file, optionally dropping element kinds
//   config: print build configuration

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::elements::{ElementKinds, Node, Relation, Way};
use crate::io::{self as pbf_io, BUF_SIZE};
use crate::pbf::block::BlockContext;
use crate::pbf::blob::Compression;
use crate::pbf::decoder::ElementSink;
use crate::pbf::frame::{MAX_BLOB_LEN, MAX_HEADER_LEN};
use crate::stream::reader::{ReadOptions, ReadOutcome};
use crate::stream::writer::WriteOptions;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_LEVEL: u32 = 6;
const DEFAULT_BLOCK_SIZE: usize = 8000;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// OpenStreetMap PBF inspector and re-encoder.
#[derive(Parser, Debug)]
#[command(
    name = "oxipbf",
    version,
    about = "OpenStreetMap PBF inspector and re-encoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output results as JSON.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print the file header and element counts.
    Info(InfoArgs),
    /// Re-encode a file.
    Cat(CatArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CompressionArg {
    Raw,
    Deflate,
    Lzma,
}

#[derive(Args, Debug)]
struct KindArgs {
    /// Skip nodes.
    #[arg(long = "no-nodes")]
    no_nodes: bool,

    /// Skip ways.
    #[arg(long = "no-ways")]
    no_ways: bool,

    /// Skip relations.
    #[arg(long = "no-relations")]
    no_relations: bool,
}

impl KindArgs {
    fn kinds(&self) -> ElementKinds {
        let mut kinds = ElementKinds::all();
        kinds.set(ElementKinds::NODES, !self.no_nodes);
        kinds.set(ElementKinds::WAYS, !self.no_ways);
        kinds.set(ElementKinds::RELATIONS, !self.no_relations);
        kinds
    }
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Input PBF file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[command(flatten)]
    kinds: KindArgs,
}

#[derive(Args, Debug)]
struct CatArgs {
    /// Input PBF file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output PBF file.
    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Blob compression.
    #[arg(long, value_enum, default_value_t = CompressionArg::Deflate)]
    compression: CompressionArg,

    /// Deflate level (0-9).
    #[arg(long, short = 'l', value_parser = clap::value_parser!(u32).range(0..=9), default_value_t = DEFAULT_LEVEL)]
    level: u32,

    /// Elements per output block.
    #[arg(long = "block-size", value_parser = clap::value_parser!(u64).range(1..), default_value_t = DEFAULT_BLOCK_SIZE as u64)]
    block_size: u64,

    /// Coordinate granularity in nanodegrees.
    #[arg(long, value_parser = clap::value_parser!(i32).range(1..), default_value_t = 100)]
    granularity: i32,

    #[command(flatten)]
    kinds: KindArgs,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    Cat,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
    kinds: ElementKinds,
    compression: CompressionArg,
    level: u32,
    block_size: usize,
    granularity: i32,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose,
        json_output: cli.json_output,
        input_file: None,
        output_file: None,
        kinds: ElementKinds::all(),
        compression: CompressionArg::Deflate,
        level: DEFAULT_LEVEL,
        block_size: DEFAULT_BLOCK_SIZE,
        granularity: 100,
    };
    match cli.command {
        Cmd::Info(args) => {
            opts.command = Command::Info;
            opts.input_file = Some(args.input);
            opts.kinds = args.kinds.kinds();
        }
        Cmd::Cat(args) => {
            opts.command = Command::Cat;
            opts.input_file = Some(args.input);
            opts.output_file = Some(args.output);
            opts.kinds = args.kinds.kinds();
            opts.compression = args.compression;
            opts.level = args.level;
            opts.block_size = usize::try_from(args.block_size).unwrap_or(usize::MAX);
            opts.granularity = args.granularity;
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("oxipbf".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let opts = resolve_options(cli);
        let _ = build_compression(&opts);
    }
}

fn build_compression(opts: &Options) -> Result<Compression, String> {
    match opts.compression {
        CompressionArg::Raw => Ok(Compression::Raw),
        CompressionArg::Deflate => Ok(Compression::Deflate(opts.level)),
        #[cfg(feature = "lzma")]
        CompressionArg::Lzma => Ok(Compression::Lzma),
        #[cfg(not(feature = "lzma"))]
        CompressionArg::Lzma => Err("LZMA support not compiled in (feature 'lzma')".into()),
    }
}

fn log_filter(opts: &Options) -> &'static str {
    if opts.quiet {
        return "error";
    }
    match opts.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("oxipbf version {version} (Rust)");

    let lzma = cfg!(feature = "lzma") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("LZMA={lzma}");
    eprintln!("DEFAULT_LEVEL={DEFAULT_LEVEL}");
    eprintln!("DEFAULT_BLOCK_SIZE={DEFAULT_BLOCK_SIZE}");
    eprintln!("MAX_HEADER_LEN={MAX_HEADER_LEN}");
    eprintln!("MAX_BLOB_LEN={MAX_BLOB_LEN}");
    eprintln!("BUF_SIZE={BUF_SIZE}");
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

/// Counts elements without keeping them.
#[derive(Debug, Default)]
struct Counter {
    tagged: u64,
    min_id: Option<i64>,
    max_id: Option<i64>,
}

impl Counter {
    fn see(&mut self, id: i64, tagged: bool) {
        self.tagged += u64::from(tagged);
        self.min_id = Some(self.min_id.map_or(id, |m| m.min(id)));
        self.max_id = Some(self.max_id.map_or(id, |m| m.max(id)));
    }
}

impl ElementSink for Counter {
    fn on_node(&mut self, _: &BlockContext, node: Node) -> crate::Result<()> {
        self.see(node.id, !node.tags.is_empty());
        Ok(())
    }

    fn on_way(&mut self, _: &BlockContext, way: Way) -> crate::Result<()> {
        self.see(way.id, !way.tags.is_empty());
        Ok(())
    }

    fn on_relation(&mut self, _: &BlockContext, relation: Relation) -> crate::Result<()> {
        self.see(relation.id, !relation.tags.is_empty());
        Ok(())
    }
}

fn cmd_info(opts: &Options) -> i32 {
    let Some(input) = &opts.input_file else {
        eprintln!("oxipbf: info requires an input file");
        return 1;
    };
    let read_opts = ReadOptions {
        kinds: opts.kinds,
        ..Default::default()
    };
    let mut reader = match pbf_io::open_reader(input, read_opts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("oxipbf: {}: {e}", input.display());
            return 1;
        }
    };

    let started = Instant::now();
    let mut counter = Counter::default();
    if let Err(e) = reader.read_to(&mut counter) {
        eprintln!("oxipbf: {}: {e}", input.display());
        return 1;
    }
    let elapsed = started.elapsed();
    let stats = reader.stats();
    let header = reader.header().cloned().unwrap_or_default();

    if opts.json_output {
        let bbox = header.bbox.map(|b| {
            serde_json::json!({
                "left": b.left,
                "right": b.right,
                "top": b.top,
                "bottom": b.bottom,
            })
        });
        let json = serde_json::json!({
            "command": "info",
            "file": input.display().to_string(),
            "writing_program": header.writing_program,
            "source": header.source,
            "required_features": header.required_features,
            "optional_features": header.optional_features,
            "bbox": bbox,
            "replication_timestamp": header.replication_timestamp,
            "replication_sequence_number": header.replication_sequence_number,
            "replication_base_url": header.replication_base_url,
            "frames": stats.frames,
            "blocks": stats.blocks,
            "bytes": stats.bytes_read,
            "nodes": stats.nodes,
            "ways": stats.ways,
            "relations": stats.relations,
            "tagged": counter.tagged,
            "min_id": counter.min_id,
            "max_id": counter.max_id,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("oxipbf: json: {e}");
                return 1;
            }
        }
        return 0;
    }

    if opts.quiet {
        return 0;
    }
    println!("File: {}", input.display());
    if let Some(program) = &header.writing_program {
        println!("Writing program: {program}");
    }
    if let Some(source) = &header.source {
        println!("Source: {source}");
    }
    println!("Required features: {}", header.required_features.join(", "));
    if !header.optional_features.is_empty() {
        println!("Optional features: {}", header.optional_features.join(", "));
    }
    if let Some(b) = header.bbox {
        println!("Bounding box: {} {} {} {}", b.left, b.bottom, b.right, b.top);
    }
    if let Some(seq) = header.replication_sequence_number {
        println!("Replication sequence: {seq}");
    }
    println!("Blocks: {}", stats.blocks);
    println!("Nodes: {}", stats.nodes);
    println!("Ways: {}", stats.ways);
    println!("Relations: {}", stats.relations);
    println!("Tagged: {}", counter.tagged);
    if let (Some(lo), Some(hi)) = (counter.min_id, counter.max_id) {
        println!("Id range: {lo}..={hi}");
    }
    if opts.verbose > 0 {
        eprintln!(
            "oxipbf: read {} bytes in {} frames, {:.3}s",
            stats.bytes_read,
            stats.frames,
            elapsed.as_secs_f64()
        );
    }
    0
}

// ---------------------------------------------------------------------------
// Cat command
// ---------------------------------------------------------------------------

fn cmd_cat(opts: &Options) -> i32 {
    let (Some(input), Some(output)) = (&opts.input_file, &opts.output_file) else {
        eprintln!("oxipbf: cat requires an input and an output file");
        return 1;
    };
    if output.exists() && !opts.force {
        eprintln!(
            "oxipbf: output file exists, use -f to overwrite: {}",
            output.display()
        );
        return 1;
    }
    let compression = match build_compression(opts) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("oxipbf: {e}");
            return 1;
        }
    };

    let read_opts = ReadOptions {
        kinds: opts.kinds,
        ..Default::default()
    };
    let write_opts = WriteOptions {
        compression,
        block_size: opts.block_size,
        context: BlockContext {
            granularity: opts.granularity,
            ..Default::default()
        },
        ..Default::default()
    };

    let started = Instant::now();
    let stats = match pbf_io::copy_file(input, output, read_opts, write_opts) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("oxipbf: cat: {e}");
            return 1;
        }
    };
    let elapsed = started.elapsed();

    if stats.outcome == ReadOutcome::Cancelled && !opts.quiet {
        eprintln!("oxipbf: warning: read was cancelled");
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "oxipbf: cat: {} -> {} bytes, {} blocks in, {} blocks out, {:.3}s",
            stats.input_size,
            stats.output_size,
            stats.read.blocks,
            stats.written.blocks,
            elapsed.as_secs_f64()
        );
    }

    if opts.json_output {
        let json = serde_json::json!({
            "command": "cat",
            "input_size": stats.input_size,
            "output_size": stats.output_size,
            "blocks_in": stats.read.blocks,
            "blocks_out": stats.written.blocks,
            "raw_blocks": stats.written.raw_blocks,
            "nodes": stats.written.nodes,
            "ways": stats.written.ways,
            "relations": stats.written.relations,
            "compression": format!("{:?}", opts.compression).to_lowercase(),
            "level": opts.level,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(s) => eprintln!("{s}"),
            Err(e) => {
                eprintln!("oxipbf: json: {e}");
                return 1;
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(&opts)))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let exit_code = match opts.command {
        Command::Info => cmd_info(&opts),
        Command::Cat => cmd_cat(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_opts(args: &[&str]) -> Options {
        let argv: Vec<String> = std::iter::once("oxipbf".to_string())
            .chain(args.iter().map(|s| s.to_string()))
            .collect();
        let cli = Cli::try_parse_from(argv).expect("cli parse failed");
        resolve_options(cli)
    }

    #[test]
    fn parse_info() {
        let opts = parse_opts(&["info", "planet.osm.pbf", "--no-ways"]);
        assert_eq!(opts.command, Command::Info);
        assert_eq!(
            opts.input_file.as_deref(),
            Some(std::path::Path::new("planet.osm.pbf"))
        );
        assert_eq!(opts.kinds, ElementKinds::NODES | ElementKinds::RELATIONS);
    }

    #[test]
    fn parse_cat_defaults() {
        let opts = parse_opts(&["cat", "in.pbf", "out.pbf"]);
        assert_eq!(opts.command, Command::Cat);
        assert_eq!(opts.compression, CompressionArg::Deflate);
        assert_eq!(opts.level, DEFAULT_LEVEL);
        assert_eq!(opts.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(build_compression(&opts), Ok(Compression::Deflate(6)));
    }

    #[test]
    fn parse_cat_options() {
        let opts = parse_opts(&[
            "-f",
            "cat",
            "in.pbf",
            "out.pbf",
            "--compression",
            "raw",
            "--block-size",
            "100",
            "--granularity",
            "1000",
            "--no-relations",
        ]);
        assert!(opts.force);
        assert_eq!(build_compression(&opts), Ok(Compression::Raw));
        assert_eq!(opts.block_size, 100);
        assert_eq!(opts.granularity, 1000);
        assert!(!opts.kinds.contains(ElementKinds::RELATIONS));
    }

    #[test]
    fn rejects_bad_level_and_block_size() {
        let parse = |args: &[&str]| {
            Cli::try_parse_from(std::iter::once("oxipbf").chain(args.iter().copied()))
        };
        assert!(parse(&["cat", "a", "b", "--level", "10"]).is_err());
        assert!(parse(&["cat", "a", "b", "--block-size", "0"]).is_err());
        assert!(parse(&["cat", "a", "b", "--granularity", "0"]).is_err());
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        let argv = ["oxipbf", "-q", "-v", "config"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn log_filter_levels() {
        assert_eq!(log_filter(&parse_opts(&["config"])), "warn");
        assert_eq!(log_filter(&parse_opts(&["-vv", "config"])), "debug");
        assert_eq!(log_filter(&parse_opts(&["-q", "config"])), "error");
    }

    #[test]
    fn fuzz_entry_does_not_panic() {
        fuzz_try_parse_args(&["cat".into(), "--level".into(), "x".into()]);
        fuzz_try_parse_args(&[]);
    }
}
