//! nestarc CLI
//!
//! Lists, reads and extracts entries of ZIP and GZIP containers, walking into
//! archives stored inside other archives.

mod utils;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use dialoguer::Confirm;
use filetime::FileTime;
use flate2::Compression;
use log::debug;
use nestarc_archive::gzip::{GzipArchive, os};
use nestarc_archive::nested::is_container;
use nestarc_archive::{
    ArchiveConfig, Navigator, Registry, ZipArchive, ZipCompressionLevel, open_path_with,
};
use nestarc_core::{AccessMode, ArchiveAccess, Format, Implementation};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use utils::{
    EntryJson, create_progress_bar, filter_entries, output_path, print_entries, unix_seconds,
};

#[derive(Parser)]
#[command(name = "nestarc")]
#[command(
    author,
    version,
    about = "Browse ZIP and GZIP containers, nested archives included"
)]
#[command(long_about = "
nestarc lists, reads and extracts entries of ZIP and GZIP containers.
Locations may cross into archives stored inside other archives.

Examples:
  nestarc list bundle.zip
  nestarc list -r bundle.zip
  nestarc list bundle.zip inner.zip/docs/
  nestarc cat bundle.zip inner.gz/payload.bin
  nestarc extract bundle.zip -o out
  nestarc members logs.gz
  nestarc create backup.zip notes.txt docs
  nestarc delete backup.zip notes.txt
")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Implementation used for the outermost container
    #[arg(long, global = true, value_enum)]
    implementation: Option<ImplementationArg>,

    /// Log debug output to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries, optionally walking into nested archives
    #[command(alias = "l")]
    List {
        /// Container file
        archive: PathBuf,

        /// Directory location inside the container (ends with /)
        #[arg(default_value = "")]
        location: String,

        /// Walk directories and nested archives
        #[arg(short, long)]
        recursive: bool,

        /// Keep directories and nested archives in the output
        #[arg(short, long)]
        containers: bool,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only entries matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,
    },

    /// Extract every file below a location, nested archives included
    #[command(alias = "x")]
    Extract {
        /// Container file
        archive: PathBuf,

        /// Directory location inside the container (ends with /)
        #[arg(default_value = "")]
        location: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Show progress bar
        #[arg(short = 'P', long, default_value = "true")]
        progress: bool,
    },

    /// Write one entry to stdout
    Cat {
        /// Container file
        archive: PathBuf,

        /// Entry location, possibly inside nested archives
        location: String,
    },

    /// Show the members of a GZIP file
    #[command(alias = "m")]
    Members {
        /// GZIP file
        archive: PathBuf,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Create a ZIP or GZIP container
    #[command(alias = "c")]
    Create {
        /// Output file; the suffix selects the format
        archive: PathBuf,

        /// Files and directories to add
        files: Vec<PathBuf>,

        /// Compression level
        #[arg(short = 'l', long, value_enum, default_value = "normal")]
        compression: CompressionLevel,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Delete entries from a ZIP container
    Delete {
        /// Container file
        archive: PathBuf,

        /// Entry names to delete
        names: Vec<String>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Detect the format of a file
    Detect {
        /// File to detect
        file: PathBuf,
    },

    /// List the registered format implementations
    Formats,

    /// Print a shell completion script
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Implementation override for the outermost container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ImplementationArg {
    /// Built-in container handling
    Native,
    /// Host codec stream wrapper (GZIP only)
    Stream,
}

impl From<ImplementationArg> for Implementation {
    fn from(arg: ImplementationArg) -> Self {
        match arg {
            ImplementationArg::Native => Implementation::Native,
            ImplementationArg::Stream => Implementation::Stream,
        }
    }
}

/// Compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
enum CompressionLevel {
    /// Store without compression
    Store,
    /// Fast compression
    Fast,
    /// Normal compression (default)
    #[default]
    Normal,
    /// Best compression
    Best,
}

impl CompressionLevel {
    fn zip_level(self) -> ZipCompressionLevel {
        match self {
            Self::Store => ZipCompressionLevel::Store,
            Self::Fast => ZipCompressionLevel::Fast,
            Self::Normal => ZipCompressionLevel::Normal,
            Self::Best => ZipCompressionLevel::Best,
        }
    }

    fn gzip_level(self) -> Compression {
        match self {
            Self::Store => Compression::none(),
            Self::Fast => Compression::fast(),
            Self::Normal => Compression::default(),
            Self::Best => Compression::best(),
        }
    }
}

/// Registry, configuration and overrides shared by every command.
struct Context {
    registry: &'static Registry,
    config: ArchiveConfig,
    implementation: Option<Implementation>,
}

impl Context {
    fn load(
        config: Option<&Path>,
        implementation: Option<ImplementationArg>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config {
            Some(path) => ArchiveConfig::from_json_file(path)?,
            None => ArchiveConfig::default(),
        };
        debug!("configuration: {:?}", config);
        Ok(Self {
            registry: Registry::global(),
            config,
            implementation: implementation.map(Implementation::from),
        })
    }

    fn open(
        &self,
        path: &Path,
        mode: AccessMode,
    ) -> Result<Box<dyn ArchiveAccess>, Box<dyn std::error::Error>> {
        Ok(open_path_with(
            self.registry,
            &self.config,
            path,
            mode,
            self.implementation,
        )?)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let ctx = match Context::load(cli.config.as_deref(), cli.implementation) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::List {
            archive,
            location,
            recursive,
            containers,
            verbose,
            json,
            include,
            exclude,
        } => cmd_list(
            &ctx,
            &archive,
            &location,
            &ListOptions {
                recursive,
                containers,
                verbose,
                json,
                include: &include,
                exclude: &exclude,
            },
        ),
        Commands::Extract {
            archive,
            location,
            output,
            include,
            exclude,
            verbose,
            progress,
        } => cmd_extract(
            &ctx, &archive, &location, &output, &include, &exclude, verbose, progress,
        ),
        Commands::Cat { archive, location } => cmd_cat(&ctx, &archive, &location),
        Commands::Members { archive, json } => cmd_members(&ctx, &archive, json),
        Commands::Create {
            archive,
            files,
            compression,
            verbose,
        } => cmd_create(&archive, &files, compression, verbose),
        Commands::Delete {
            archive,
            names,
            yes,
        } => cmd_delete(&ctx, &archive, &names, yes),
        Commands::Detect { file } => cmd_detect(&ctx, &file),
        Commands::Formats => cmd_formats(&ctx),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "nestarc", &mut io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Options for listing entries.
struct ListOptions<'a> {
    recursive: bool,
    containers: bool,
    verbose: bool,
    json: bool,
    include: &'a [String],
    exclude: &'a [String],
}

/// JSON output for a listing.
#[derive(Debug, Serialize)]
struct ListJson {
    archive: String,
    format: String,
    implementation: String,
    location: String,
    entries: Vec<EntryJson>,
}

fn cmd_list(
    ctx: &Context,
    archive: &Path,
    location: &str,
    options: &ListOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut access = ctx.open(archive, AccessMode::Read)?;
    let id = access.id();

    let mut navigator = Navigator::new(ctx.registry, &ctx.config);
    let entries = navigator.list_entries(
        access.as_mut(),
        location,
        options.containers,
        options.recursive,
    )?;
    let entries = filter_entries(&entries, options.include, options.exclude);
    access.release()?;

    if options.json {
        let listing = ListJson {
            archive: archive.display().to_string(),
            format: id.format.to_string(),
            implementation: id.implementation.to_string(),
            location: location.to_string(),
            entries: entries.iter().map(EntryJson::from_entry).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Archive: {} ({})", archive.display(), id);
    if navigator.layers_opened() > 0 {
        println!(
            "Nested archives opened: {} ({} extracted)",
            navigator.layers_opened(),
            navigator.extractions()
        );
    }
    println!();
    print_entries(&entries, options.verbose);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_extract(
    ctx: &Context,
    archive: &Path,
    location: &str,
    output: &Path,
    include: &[String],
    exclude: &[String],
    verbose: bool,
    progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut access = ctx.open(archive, AccessMode::Read)?;
    let mut navigator = Navigator::new(ctx.registry, &ctx.config);

    let entries = navigator.list_entries(access.as_mut(), location, false, true)?;
    let selected = filter_entries(&entries, include, exclude);
    let locations: Vec<String> = selected.iter().map(|e| e.name.clone()).collect();

    println!("Extracting {} to {}", archive.display(), output.display());
    let pb = create_progress_bar(selected.len() as u64, progress);
    pb.set_message("files");

    let mut index = 0;
    navigator.read_each(access.as_mut(), &locations, |name, data| {
        let target = output_path(output, name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &data)?;

        let entry = &selected[index];
        index += 1;
        if entry.has_modified() {
            filetime::set_file_mtime(&target, FileTime::from_system_time(entry.last_modified))?;
        }
        if verbose {
            pb.println(format!("  Extracted: {} ({} bytes)", name, data.len()));
        }
        pb.inc(1);
        Ok(())
    })?;
    pb.finish_with_message("Done");

    access.release()?;
    Ok(())
}

fn cmd_cat(
    ctx: &Context,
    archive: &Path,
    location: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut access = ctx.open(archive, AccessMode::Read)?;
    let data = Navigator::new(ctx.registry, &ctx.config).read_entry(access.as_mut(), location)?;
    access.release()?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

/// JSON output for one GZIP member.
#[derive(Debug, Serialize)]
struct MemberJson {
    name: String,
    embedded_name: bool,
    offset: u64,
    data_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<i64>,
    os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

fn cmd_members(
    ctx: &Context,
    archive: &Path,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let mut gzip = GzipArchive::new(
        Box::new(file),
        Some(archive.to_path_buf()),
        AccessMode::Read,
        ctx.config.max_gzip_members,
    )?;

    if json {
        let members: Vec<MemberJson> = gzip
            .members()
            .iter()
            .map(|m| MemberJson {
                name: m.name.clone(),
                embedded_name: m.has_embedded_name(),
                offset: m.offset,
                data_offset: m.data_offset,
                compressed_length: m.compressed_length(),
                length: m.length,
                crc: m.crc32,
                mtime: unix_seconds(m.header.last_modified()),
                os: os::name(m.header.os).to_string(),
                comment: m.header.comment.clone(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&members)?);
    } else {
        println!("GZIP: {} ({} members)", archive.display(), gzip.members().len());
        println!();
        println!(
            "{:>4} {:>10} {:>10} {:>10} {:>8}  {:<10} Name",
            "#", "Offset", "Compressed", "Size", "CRC32", "OS"
        );
        println!("{}", "-".repeat(72));
        for (i, m) in gzip.members().iter().enumerate() {
            println!(
                "{:>4} {:>10} {:>10} {:>10} {:>8}  {:<10} {}{}",
                i,
                m.offset,
                m.compressed_length()
                    .map_or_else(|| "?".to_string(), |n| n.to_string()),
                m.length.map_or_else(|| "?".to_string(), |n| n.to_string()),
                m.crc32
                    .map_or_else(|| "?".to_string(), |c| format!("{:08x}", c)),
                os::name(m.header.os),
                m.name,
                if m.has_embedded_name() { "" } else { " (derived)" },
            );
        }
    }

    gzip.release()?;
    Ok(())
}

fn cmd_create(
    archive: &Path,
    files: &[PathBuf],
    compression: CompressionLevel,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = Format::from_path_suffix(&archive.to_string_lossy());

    let mut inputs = Vec::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| format!("cannot add {}", path.display()))?;
        collect_inputs(path, name, &mut inputs)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(archive)?;
    let root = Some(archive.to_path_buf());

    let mut access: Box<dyn ArchiveAccess> = match format {
        Format::Zip => {
            let mut zip = ZipArchive::new(Box::new(file), root, AccessMode::Create)?;
            zip.set_compression(compression.zip_level());
            Box::new(zip)
        }
        Format::GZip => {
            if inputs.len() != 1 || inputs[0].1.is_none() {
                return Err("a GZIP file holds exactly one file".into());
            }
            let mut gzip = GzipArchive::new(Box::new(file), root, AccessMode::Create, -1)?;
            gzip.set_compression(compression.gzip_level());
            Box::new(gzip)
        }
        other => return Err(format!("cannot create {} containers", other).into()),
    };

    for (name, source) in &inputs {
        let entry = access.create_entry(name)?;
        if let Some(source) = source {
            let data = fs::read(source)?;
            access.entry_writer(&entry)?.write_all(&data)?;
        }
        if verbose {
            println!("  Added: {}", entry.name);
        }
    }
    access.release()?;

    println!("Created {} ({} entries)", archive.display(), inputs.len());
    Ok(())
}

/// Gather `(entry name, source file)` pairs; directories have no source.
fn collect_inputs(
    path: &Path,
    name: String,
    inputs: &mut Vec<(String, Option<PathBuf>)>,
) -> Result<(), Box<dyn std::error::Error>> {
    if path.is_dir() {
        inputs.push((format!("{}/", name), None));
        let mut children: Vec<_> = fs::read_dir(path)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let child_name = format!("{}/{}", name, child.file_name().to_string_lossy());
            collect_inputs(&child.path(), child_name, inputs)?;
        }
    } else {
        inputs.push((name, Some(path.to_path_buf())));
    }
    Ok(())
}

fn cmd_delete(
    ctx: &Context,
    archive: &Path,
    names: &[String],
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if names.is_empty() {
        return Ok(());
    }
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete {} entries from {}?",
                names.len(),
                archive.display()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            return Ok(());
        }
    }

    let mut access = ctx.open(archive, AccessMode::Update)?;
    for name in names {
        if access.delete_entry(name)? {
            println!("  Deleted: {}", name);
        } else {
            println!("  Not found: {}", name);
        }
    }
    access.release()?;
    Ok(())
}

fn cmd_detect(ctx: &Context, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut f = File::open(file)?;
    let (magic_format, magic) = Format::detect(&mut f)?;
    let suffixes = Format::from_file_name(&file.to_string_lossy());

    println!("File: {}", file.display());
    if suffixes.is_empty() {
        println!("Suffix formats: none");
    } else {
        let names: Vec<String> = suffixes.iter().map(Format::to_string).collect();
        println!("Suffix formats: {}", names.join(" > "));
    }
    println!("Magic format: {}", magic_format);
    println!("Magic bytes: {:02X?}", &magic[..magic.len().min(16)]);

    let format = suffixes.first().copied().unwrap_or(magic_format);
    if format != Format::None {
        println!("Supported: {}", ctx.registry.is_supported(format));
        println!("Seekable: {}", format.is_seekable());
        println!(
            "Opens as nested container: {}",
            is_container(ctx.registry, &file.to_string_lossy())
        );
    }
    Ok(())
}

fn cmd_formats(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    for id in ctx.registry.registered() {
        let preferred = id.implementation == id.format.preferred_implementation();
        println!(
            "{:<6} {:<8}{}",
            id.format.to_string(),
            id.implementation.to_string(),
            if preferred { " (preferred)" } else { "" }
        );
    }
    Ok(())
}
