//! StoreBridge CLI - copy, delete and list across S3, SFTP and local storage

use clap::Parser;
use storebridge::config::{parse_size, CliArgs, Commands, Location, OutputFormat};
use storebridge::copier::{Copier, CopyStats};
use storebridge::error::{BridgeError, Result};
use storebridge::path::RemotePath;
use storebridge::progress::ProgressReporter;
use storebridge::storage::{Directory, Endpoint, File, LocalStore, SftpStore};
#[cfg(feature = "native_s3")]
use storebridge::storage::S3Store;
use storebridge::walk::{EntryType, TreeEntry, TreeListing, TreeWalker};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_logging(&args);

    // Handle result
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        for failure in e.failures() {
            eprintln!("  - {}", failure);
        }
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Any backend a location can point to
enum AnyStore {
    Local(LocalStore),
    Sftp(SftpStore),
    #[cfg(feature = "native_s3")]
    S3(S3Store),
}

/// Run `$body` with `$store` bound to the concrete endpoint
macro_rules! with_store {
    ($any:expr, $store:ident => $body:expr) => {
        match $any {
            AnyStore::Local($store) => $body,
            AnyStore::Sftp($store) => $body,
            #[cfg(feature = "native_s3")]
            AnyStore::S3($store) => $body,
        }
    };
}

impl AnyStore {
    fn open(args: &CliArgs, location: &Location) -> Result<Self> {
        match location {
            Location::Local { .. } => Ok(Self::Local(LocalStore::open(PathBuf::from("/"))?)),
            Location::Sftp {
                user, host, port, ..
            } => Ok(Self::Sftp(SftpStore::open(args.sftp_options(user, host, *port))?)),
            #[cfg(feature = "native_s3")]
            Location::S3 { bucket, .. } => Ok(Self::S3(S3Store::open(args.s3_options(bucket))?)),
            #[cfg(not(feature = "native_s3"))]
            Location::S3 { bucket, .. } => Err(BridgeError::config(format!(
                "s3://{} requires the native_s3 feature",
                bucket
            ))),
        }
    }

    fn close(&mut self) {
        with_store!(self, store => store.close())
    }
}

fn run(args: &CliArgs) -> Result<()> {
    match &args.command {
        Commands::Copy {
            source,
            destination,
            buffer_size,
            progress,
        } => cmd_copy(args, source, destination, buffer_size, *progress),
        Commands::Delete { target, recursive } => cmd_delete(args, target, *recursive),
        Commands::List {
            target,
            depth,
            output_format,
        } => cmd_list(args, target, *depth, *output_format),
    }
}

fn cmd_copy(
    args: &CliArgs,
    source: &str,
    destination: &str,
    buffer_size: &str,
    show_progress: bool,
) -> Result<()> {
    let buffer_size = parse_size(buffer_size).map_err(BridgeError::config)?;
    if buffer_size == 0 {
        return Err(BridgeError::config("Buffer size must be greater than zero"));
    }

    let src_location = Location::parse(source)?;
    let dst_location = Location::parse(destination)?;

    // Create progress reporter
    let progress = if args.quiet || !show_progress {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new()
    };
    let copier = Copier::new()
        .with_buffer_size(buffer_size as usize)
        .with_progress(progress);

    let mut src_store = AnyStore::open(args, &src_location)?;
    let mut dst_store = match AnyStore::open(args, &dst_location) {
        Ok(store) => store,
        Err(e) => {
            src_store.close();
            return Err(e);
        }
    };

    let result = with_store!(&src_store, src => with_store!(&dst_store, dst => {
        copy_between(&copier, src, &src_location, dst, &dst_location)
    }));

    src_store.close();
    dst_store.close();

    if let Some(progress) = copier.progress() {
        match &result {
            Ok(_) => progress.finish_success("Copy complete"),
            Err(_) => progress.finish_error("Copy failed"),
        }
    }

    let stats = result?;
    if !args.quiet {
        stats.print_summary();
    }
    Ok(())
}

/// Pick file or directory semantics from the existing source and destination
fn copy_between<S: Endpoint, D: Endpoint>(
    copier: &Copier,
    src: &S,
    src_location: &Location,
    dst: &D,
    dst_location: &Location,
) -> Result<CopyStats> {
    let src_dir = src.directory(src_location.path());
    let dst_dir = dst.directory(dst_location.path());

    if src_location.is_directory_hint() || src_dir.exists()? {
        if src_location.contains(dst_location) {
            return Err(BridgeError::InvalidPath(format!(
                "cannot copy {} into itself ({})",
                src_location.path(),
                dst_location.path()
            )));
        }
        return copier.copy_directory(&src_dir, &dst_dir);
    }

    let src_file = file_at(src, src_location.path())?;
    if dst_location.is_directory_hint() || dst_dir.exists()? {
        return copier.copy_file_to_directory(&src_file, &dst_dir);
    }

    let dst_file = file_at(dst, dst_location.path())?;
    copier.copy_file(&src_file, &dst_file)
}

/// Reference the file at `path`; the root cannot be a file
fn file_at<E: Endpoint>(endpoint: &E, path: &str) -> Result<E::File> {
    let path = RemotePath::parse(path);
    let parent = path
        .parent()
        .ok_or_else(|| BridgeError::InvalidPath(format!("{} is not a file", path)))?;
    endpoint.file(&endpoint.directory(&parent.to_string()), path.name())
}

fn cmd_delete(args: &CliArgs, target: &str, recursive: bool) -> Result<()> {
    let location = Location::parse(target)?;
    let mut store = AnyStore::open(args, &location)?;

    let result = with_store!(&store, endpoint => delete_at(endpoint, &location, recursive));
    store.close();
    result?;

    if !args.quiet {
        println!("Deleted {}", location.path());
    }
    Ok(())
}

fn delete_at<E: Endpoint>(endpoint: &E, location: &Location, recursive: bool) -> Result<()> {
    let dir = endpoint.directory(location.path());
    if dir.exists()? {
        if recursive {
            dir.delete_recursively()
        } else {
            dir.delete()
        }
    } else {
        file_at(endpoint, location.path())?.delete()
    }
}

fn cmd_list(
    args: &CliArgs,
    target: &str,
    depth: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let location = Location::parse(target)?;
    let mut store = AnyStore::open(args, &location)?;

    let result = with_store!(&store, endpoint => list_at(endpoint, &location, depth));
    store.close();
    let entries = result?;

    match format {
        OutputFormat::Text => {
            for entry in &entries {
                print_entry(entry);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&entries)
                .map_err(|e| BridgeError::io("Cannot render listing", e))?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn list_at<E: Endpoint>(
    endpoint: &E,
    location: &Location,
    depth: Option<usize>,
) -> Result<Vec<TreeEntry>> {
    let dir = endpoint.directory(location.path());
    if !dir.exists()? {
        return Err(BridgeError::DirectoryNotFound(dir.full_path()));
    }

    let walker = depth.map_or_else(TreeWalker::new, TreeWalker::with_depth_limit);
    let mut listing = TreeListing::new();
    walker.walk(&dir, &mut listing)?;
    Ok(listing.into_entries())
}

fn print_entry(entry: &TreeEntry) {
    let indent = "  ".repeat(entry.depth);
    match entry.kind {
        EntryType::Directory => println!("{}{}/", indent, entry.path.trim_end_matches('/')),
        EntryType::File => println!("{}{}", indent, entry.path),
    }
}
