//! Configuration settings for StoreBridge
//!
//! Defines the CLI arguments, location syntax and backend option loading.

use crate::error::{BridgeError, Result};
use crate::path::{join_path, split_path, RemotePath};
use crate::storage::filesystem::SftpOptions;
#[cfg(feature = "native_s3")]
use crate::storage::object::S3Options;
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// StoreBridge - copy files and trees between object stores and remote filesystems
#[derive(Parser, Debug, Clone)]
#[command(name = "storebridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Copy files and directory trees between S3, SFTP and local storage")]
#[command(long_about = r#"
StoreBridge copies files and directory trees between heterogeneous storage
backends behind one uniform abstraction.

Locations:
  s3://bucket/path                   Amazon S3 or an S3-compatible service
  user@host:/path                    SFTP
  sftp://user@host[:port]/path       SFTP with an explicit port
  /any/other/path                    Local filesystem

A trailing '/' marks a location as a directory.

Examples:
  storebridge copy s3://bucket/reports/ backup@nas:/srv/reports/
  storebridge copy ./report.pdf s3://bucket/inbox/
  storebridge list s3://bucket/data --depth 2
  storebridge delete backup@nas:/srv/old --recursive
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// SSH port used for user@host:/path locations
    #[arg(long, default_value = "22", value_name = "PORT", global = true)]
    pub ssh_port: u16,

    /// SSH private key path
    #[arg(long, value_name = "PATH", global = true)]
    pub ssh_key: Option<PathBuf>,

    /// SSH password
    #[arg(long, env = "SFTP_PASSWORD", hide_env_values = true, value_name = "PASSWORD", global = true)]
    pub ssh_password: Option<String>,

    /// TCP connect timeout for SFTP in milliseconds
    #[arg(long, default_value = "120000", value_name = "MS", global = true)]
    pub connect_timeout_ms: u64,

    /// S3 region (default: AWS_REGION or us-east-1)
    #[arg(long, value_name = "REGION", global = true)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint URL (MinIO, Ceph, ...)
    #[arg(long, value_name = "URL", global = true)]
    pub s3_endpoint: Option<String>,

    /// Use path-style S3 URLs
    #[arg(long, global = true)]
    pub s3_path_style: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy a file or a directory tree
    Copy {
        /// Source location
        #[arg(value_name = "SOURCE")]
        source: String,

        /// Destination location
        #[arg(value_name = "DESTINATION")]
        destination: String,

        /// Relay buffer size (e.g., 64K, 1M)
        #[arg(short = 'b', long, default_value = "64K", value_name = "SIZE")]
        buffer_size: String,

        /// Show live progress
        #[arg(short = 'p', long)]
        progress: bool,
    },

    /// Delete a file or a directory
    Delete {
        /// Target location
        #[arg(value_name = "TARGET")]
        target: String,

        /// Delete non-empty directories with all their content
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// List a directory tree
    List {
        /// Directory location
        #[arg(value_name = "TARGET")]
        target: String,

        /// Maximum depth to list (root is 0)
        #[arg(short = 'd', long, value_name = "N")]
        depth: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

impl CliArgs {
    /// Log level derived from -v / -q, used when RUST_LOG is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// SFTP options for a location, filled in from the global flags
    pub fn sftp_options(&self, user: &str, host: &str, port: Option<u16>) -> SftpOptions {
        let mut options = SftpOptions::new(host, user);
        options.port = port.unwrap_or(self.ssh_port);
        options.key_path = self.ssh_key.clone();
        options.password = self.ssh_password.clone();
        options.connect_timeout_ms = self.connect_timeout_ms;
        options
    }

    /// S3 options for a bucket: environment first, then the global flags
    #[cfg(feature = "native_s3")]
    pub fn s3_options(&self, bucket: &str) -> S3Options {
        let mut options = S3Options::from_env(bucket);
        if let Some(region) = &self.s3_region {
            options.region = region.clone();
        }
        if let Some(endpoint) = &self.s3_endpoint {
            options.endpoint_url = Some(endpoint.clone());
        }
        if self.s3_path_style {
            options.force_path_style = true;
        }
        options
    }
}

/// Where a CLI argument points to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// `s3://bucket/path`
    S3 {
        /// Bucket name
        bucket: String,
        /// Path inside the bucket
        path: String,
        /// Ends in `/`
        trailing_slash: bool,
    },
    /// `user@host:/path` or `sftp://user@host[:port]/path`
    Sftp {
        /// Login user
        user: String,
        /// Remote host
        host: String,
        /// Explicit port, if any
        port: Option<u16>,
        /// Remote path
        path: String,
        /// Ends in `/`
        trailing_slash: bool,
    },
    /// Local filesystem path, made absolute
    Local {
        /// Absolute path
        path: String,
        /// Ends in `/`
        trailing_slash: bool,
    },
}

impl Location {
    /// Parse a location argument
    pub fn parse(location: &str) -> Result<Self> {
        let trailing_slash = location.len() > 1 && location.ends_with('/');

        if let Some((bucket, key)) = parse_s3_url(location) {
            if bucket.is_empty() {
                return Err(BridgeError::config(format!("Missing bucket in '{}'", location)));
            }
            return Ok(Self::S3 {
                bucket,
                path: normalize(&key),
                trailing_slash,
            });
        }

        if let Some(rest) = location.strip_prefix("sftp://") {
            let (authority, path) = match rest.split_once('/') {
                Some((authority, path)) => (authority, path),
                None => (rest, ""),
            };
            let (user, host_port) = authority.split_once('@').ok_or_else(|| {
                BridgeError::config(format!("Missing user in '{}'", location))
            })?;
            let (host, port) = match host_port.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port.parse::<u16>().map_err(|_| {
                        BridgeError::config(format!("Invalid port '{}' in '{}'", port, location))
                    })?;
                    (host, Some(port))
                }
                None => (host_port, None),
            };
            return Self::sftp(location, user, host, port, path, trailing_slash);
        }

        if let Some((user, host, path)) = parse_remote_path(location) {
            return Self::sftp(location, &user, &host, None, &path, trailing_slash);
        }

        let path = PathBuf::from(location);
        let absolute = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(|e| BridgeError::config(format!("Cannot resolve '{}': {}", location, e)))?
                .join(path)
        };
        Ok(Self::Local {
            path: normalize(&absolute.to_string_lossy()),
            trailing_slash,
        })
    }

    fn sftp(
        location: &str,
        user: &str,
        host: &str,
        port: Option<u16>,
        path: &str,
        trailing_slash: bool,
    ) -> Result<Self> {
        if user.is_empty() || host.is_empty() {
            return Err(BridgeError::config(format!(
                "Expected user@host in '{}'",
                location
            )));
        }
        Ok(Self::Sftp {
            user: user.to_string(),
            host: host.to_string(),
            port,
            path: normalize(path),
            trailing_slash,
        })
    }

    /// Canonical path on the backend
    pub fn path(&self) -> &str {
        match self {
            Self::S3 { path, .. } | Self::Sftp { path, .. } | Self::Local { path, .. } => path,
        }
    }

    /// Whether the argument was written as a directory (trailing `/`)
    pub fn is_directory_hint(&self) -> bool {
        match self {
            Self::S3 { trailing_slash, .. }
            | Self::Sftp { trailing_slash, .. }
            | Self::Local { trailing_slash, .. } => *trailing_slash,
        }
    }
}

impl Location {
    /// Whether `other` is this location or lies below it on the same backend
    pub fn contains(&self, other: &Location) -> bool {
        let same_backend = match (self, other) {
            (Self::S3 { bucket: a, .. }, Self::S3 { bucket: b, .. }) => a == b,
            (
                Self::Sftp { host: a, port: pa, .. },
                Self::Sftp { host: b, port: pb, .. },
            ) => a == b && pa == pb,
            (Self::Local { .. }, Self::Local { .. }) => true,
            _ => false,
        };
        same_backend && RemotePath::parse(other.path()).starts_with(&RemotePath::parse(self.path()))
    }
}

fn normalize(path: &str) -> String {
    join_path(&split_path(path))
}

/// Parse size string (e.g., "1M", "64K", "1G")
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else {
        (size.trim_end_matches('B'), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;
    if num < 0.0 {
        return Err(format!("Negative size: {}", size));
    }

    Ok((num * multiplier as f64) as u64)
}

/// Parse an S3 URL into bucket and key
pub fn parse_s3_url(url: &str) -> Option<(String, String)> {
    let path = url.strip_prefix("s3://")?;
    let mut parts = path.splitn(2, '/');
    let bucket = parts.next()?.to_string();
    let key = parts.next().unwrap_or("").to_string();

    Some((bucket, key))
}

/// Parse remote path (user@host:/path)
pub fn parse_remote_path(path: &str) -> Option<(String, String, String)> {
    let (user_host, remote_path) = path.split_once(':')?;
    let (user, host) = user_host.split_once('@')?;
    if user.contains('/') || host.contains('/') {
        return None;
    }
    Some((user.to_string(), host.to_string(), remote_path.to_string()))
}
