use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use univfs_common::{load_config, FileUrl};
use univfs_core::{ChecksumAlgorithm, FileFactory, FileKind, FileOps, FileRef, FileRefExt};

#[derive(Parser)]
#[command(name = "univfs")]
#[command(author = "univfs Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Browse and manipulate files through URLs, archives included", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the children of a directory or archive
    Ls {
        /// Location to list (path or URL)
        location: String,

        /// Include hidden files
        #[arg(short, long)]
        all: bool,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a file's content to stdout
    Cat {
        location: String,
    },

    /// Copy a file or directory
    Cp {
        source: String,
        destination: String,
    },

    /// Move a file or directory
    Mv {
        source: String,
        destination: String,
    },

    /// Delete a file or directory
    Rm {
        location: String,

        /// Delete directories and their content
        #[arg(short, long)]
        recursive: bool,
    },

    /// Print a file's checksum
    Checksum {
        location: String,

        /// sha224, sha256, sha384, sha512 or blake3
        #[arg(short, long, default_value = "sha256")]
        algorithm: ChecksumAlgorithm,
    },

    /// Change permissions to an octal mode such as 644
    Chmod {
        mode: String,
        location: String,
    },

    /// Describe a location and the file it resolves to
    Info {
        location: String,
    },
}

fn main() {
    // Initialize tracing to stderr (so command output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    let loaded = load_config(false).context("Failed to load configuration")?;
    debug!("Configuration: {}", loaded.path.display());
    let factory = FileFactory::from_config(&loaded.config).context("Failed to set up file factory")?;

    match command {
        Commands::Ls {
            location,
            all,
            json,
        } => run_ls(&factory, &location, all, json),
        Commands::Cat { location } => run_cat(&factory, &location),
        Commands::Cp {
            source,
            destination,
        } => run_transfer(&factory, &source, &destination, false),
        Commands::Mv {
            source,
            destination,
        } => run_transfer(&factory, &source, &destination, true),
        Commands::Rm {
            location,
            recursive,
        } => run_rm(&factory, &location, recursive),
        Commands::Checksum {
            location,
            algorithm,
        } => {
            let file = locate(&factory, &location)?;
            let sum = file
                .checksum(algorithm)
                .with_context(|| format!("Failed to checksum {}", file.url()))?;
            println!("{}  {}", sum, file.url());
            Ok(())
        }
        Commands::Chmod { mode, location } => run_chmod(&factory, &mode, &location),
        Commands::Info { location } => run_info(&factory, &location),
    }
}

/// Resolves a command-line argument. Anything without a scheme is a local
/// path, relative ones taken from the working directory.
fn locate(factory: &FileFactory, text: &str) -> Result<FileRef> {
    let file = if !text.contains("://") && Path::new(text).is_relative() && !text.starts_with('~')
    {
        let cwd = std::env::current_dir().context("Failed to read working directory")?;
        factory.resolve(&FileUrl::from_local_path(&cwd.join(text)), None)
    } else {
        factory.get_file(text)
    };
    file.with_context(|| format!("Failed to resolve {}", text))
}

#[derive(Serialize)]
struct JsonEntry {
    name: String,
    url: String,
    is_dir: bool,
    is_archive: bool,
    size: Option<u64>,
    modified_unix: Option<u64>,
    permissions: String,
}

fn run_ls(factory: &FileFactory, location: &str, all: bool, json: bool) -> Result<()> {
    let dir = locate(factory, location)?;
    if !dir.is_browsable() {
        bail!("{} is neither a directory nor an archive", dir.url());
    }

    let children: Vec<FileRef> = factory
        .ls(&dir)
        .with_context(|| format!("Failed to list {}", dir.url()))?
        .into_iter()
        .filter(|child| all || !child.is_hidden())
        .collect();
    info!("{} entries in {}", children.len(), dir.url());

    if json {
        let entries: Vec<JsonEntry> = children
            .iter()
            .map(|child| JsonEntry {
                name: child.name(),
                url: child.url().to_string_with(true, true),
                is_dir: child.is_directory(),
                is_archive: child.is_archive(),
                size: child.size(),
                modified_unix: system_time_to_unix(child.last_modified()),
                permissions: child.permissions_string(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for child in &children {
        let size = child.size().map_or_else(|| "-".to_string(), |s| s.to_string());
        let suffix = if child.is_directory() {
            "/"
        } else if child.is_archive() {
            "!"
        } else {
            ""
        };
        println!(
            "{} {:>12} {}{}",
            child.permissions_string(),
            size,
            child.name(),
            suffix
        );
    }
    Ok(())
}

fn run_cat(factory: &FileFactory, location: &str) -> Result<()> {
    let file = locate(factory, location)?;
    let mut input = file
        .input_stream()
        .with_context(|| format!("Failed to open {}", file.url()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let copied = std::io::copy(&mut input, &mut out);
    let closed = input.close();
    copied.with_context(|| format!("Failed to read {}", file.url()))?;
    closed?;
    out.flush()?;
    Ok(())
}

fn run_transfer(factory: &FileFactory, source: &str, destination: &str, is_move: bool) -> Result<()> {
    let source = locate(factory, source)?;
    let mut dest = locate(factory, destination)?;
    // Copying into an existing directory keeps the source's name
    if dest.is_directory() && !source.is_same_file(dest.as_ref()) {
        dest = dest.child(&source.name())?;
    }

    if is_move {
        source
            .move_to_with(dest.as_ref(), factory.copy_buffer_size())
            .with_context(|| format!("Failed to move {} to {}", source.url(), dest.url()))?;
        info!("Moved {} to {}", source.url(), dest.url());
    } else {
        source
            .copy_to_with(dest.as_ref(), factory.copy_buffer_size())
            .with_context(|| format!("Failed to copy {} to {}", source.url(), dest.url()))?;
        info!("Copied {} to {}", source.url(), dest.url());
    }
    Ok(())
}

fn run_rm(factory: &FileFactory, location: &str, recursive: bool) -> Result<()> {
    let file = locate(factory, location)?;
    if !file.exists() {
        bail!("{} does not exist", file.url());
    }

    let deleted = if file.is_directory() && !file.is_symlink() {
        if !recursive {
            bail!("{} is a directory (use --recursive)", file.url());
        }
        file.delete_recursively()
    } else {
        file.delete()
    };
    deleted.with_context(|| format!("Failed to delete {}", file.url()))?;

    info!("Deleted {}", file.url());
    Ok(())
}

fn parse_mode(mode: &str) -> Result<u16> {
    let bits = u16::from_str_radix(mode, 8).with_context(|| format!("Invalid octal mode {}", mode))?;
    if bits > 0o777 {
        bail!("Mode {} is out of range", mode);
    }
    Ok(bits)
}

fn run_chmod(factory: &FileFactory, mode: &str, location: &str) -> Result<()> {
    let bits = parse_mode(mode)?;
    let file = locate(factory, location)?;
    let changeable = file.changeable_permissions();
    if bits & !changeable != 0 {
        info!(
            "Only {:o} can be changed on {}, other bits are ignored",
            changeable,
            file.url()
        );
    }
    file.change_permissions(bits)
        .with_context(|| format!("Failed to change permissions of {}", file.url()))?;
    println!("{} {}", file.permissions_string(), file.url());
    Ok(())
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Raw => "file",
        FileKind::ArchiveRoot => "archive",
        FileKind::ArchiveEntry => "archive entry",
    }
}

fn run_info(factory: &FileFactory, location: &str) -> Result<()> {
    let file = locate(factory, location)?;
    let url = file.url();

    println!("location:      {}", url.to_string_with(true, true));
    println!("scheme:        {}", url.scheme());
    println!("host:          {}", url.host().unwrap_or("-"));
    println!(
        "port:          {}",
        url.effective_port()
            .map_or_else(|| "-".to_string(), |p| p.to_string())
    );
    println!("path:          {}", url.path());
    println!("realm:         {}", url.realm());
    println!("kind:          {}", kind_label(file.kind()));
    println!("exists:        {}", file.exists());
    println!("directory:     {}", file.is_directory());
    println!(
        "size:          {}",
        file.size().map_or_else(|| "-".to_string(), |s| s.to_string())
    );
    println!(
        "modified:      {}",
        system_time_to_unix(file.last_modified()).unwrap_or(0)
    );
    println!("permissions:   {}", file.permissions_string());
    println!("archive depth: {}", file.archive_boundaries());
    println!("ancestors:");
    for ancestor in file.ancestors().skip(1) {
        println!("  {} ({})", ancestor.url(), kind_label(ancestor.kind()));
    }
    Ok(())
}

fn system_time_to_unix(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}
