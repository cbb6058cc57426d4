//! SFTP client
//!
//! One SSH session with one SFTP channel per endpoint. Authentication tries,
//! in order: a private key file, a password, then the SSH agent.

use super::{DirEntry, EntryKind, FsClient};
use crate::error::{BridgeError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use ssh2::{ErrorCode, FileStat, Session, Sftp};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SFTP status code for a missing file
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default TCP connect timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 120_000;

/// Connection options for an SFTP server
#[derive(Clone, Serialize, Deserialize)]
pub struct SftpOptions {
    /// Remote host
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Password authentication
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Private key file
    pub key_path: Option<PathBuf>,
    /// Passphrase of the private key
    #[serde(skip_serializing)]
    pub passphrase: Option<String>,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl SftpOptions {
    /// Options for `user@host` on the default port
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            user: user.into(),
            password: None,
            key_path: None,
            passphrase: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(BridgeError::config("SFTP host is required"));
        }
        if self.user.is_empty() {
            return Err(BridgeError::config("SFTP user is required"));
        }
        if self.port == 0 {
            return Err(BridgeError::config("SFTP port must not be 0"));
        }
        Ok(())
    }
}

impl fmt::Debug for SftpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SftpOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("key_path", &self.key_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "********"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

/// Client over one SSH session and SFTP channel
pub struct SftpClient {
    sftp: Sftp,
    session: Session,
    target: String,
}

impl SftpClient {
    fn authenticate(session: &Session, options: &SftpOptions, target: &str) -> Result<()> {
        if let Some(key_path) = &options.key_path {
            session
                .userauth_pubkey_file(&options.user, None, key_path, options.passphrase.as_deref())
                .map_err(|e| BridgeError::connection(target, format!("Key authentication failed: {}", e)))?;
        } else if let Some(password) = &options.password {
            session
                .userauth_password(&options.user, password)
                .map_err(|e| {
                    BridgeError::connection(target, format!("Password authentication failed: {}", e))
                })?;
        } else {
            let mut agent = session
                .agent()
                .map_err(|e| BridgeError::connection(target, e.to_string()))?;
            agent
                .connect()
                .map_err(|e| BridgeError::connection(target, e.to_string()))?;
            agent
                .list_identities()
                .map_err(|e| BridgeError::connection(target, e.to_string()))?;

            let identities = agent.identities().unwrap_or_default();
            let authenticated = identities
                .iter()
                .any(|identity| agent.userauth(&options.user, identity).is_ok());
            if !authenticated {
                return Err(BridgeError::connection(
                    target,
                    "No valid SSH key found in agent",
                ));
            }
        }

        if !session.authenticated() {
            return Err(BridgeError::connection(target, "Authentication failed"));
        }
        Ok(())
    }
}

fn kind_of(stat: &FileStat) -> EntryKind {
    if stat.is_dir() {
        EntryKind::Directory
    } else if stat.is_file() {
        EntryKind::File
    } else {
        EntryKind::Other
    }
}

impl FsClient for SftpClient {
    type Options = SftpOptions;
    type Reader = ssh2::File;
    type Writer = ssh2::File;

    fn connect(options: &SftpOptions) -> Result<Self> {
        options.validate()?;
        let target = Self::target(options);
        let timeout = Duration::from_millis(options.connect_timeout_ms);

        let addrs = (options.host.as_str(), options.port)
            .to_socket_addrs()
            .map_err(|e| BridgeError::connection(&target, e.to_string()))?;

        let mut last_error = None;
        let tcp = addrs
            .into_iter()
            .find_map(|addr| match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    tracing::debug!("Cannot connect to {}: {}", addr, e);
                    last_error = Some(e);
                    None
                }
            })
            .ok_or_else(|| {
                let message = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "host name did not resolve".to_string());
                BridgeError::connection(&target, message)
            })?;

        let mut session =
            Session::new().map_err(|e| BridgeError::connection(&target, e.to_string()))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| BridgeError::connection(&target, e.to_string()))?;

        Self::authenticate(&session, options, &target)?;

        let sftp = session
            .sftp()
            .map_err(|e| BridgeError::connection(&target, e.to_string()))?;

        Ok(Self {
            sftp,
            session,
            target,
        })
    }

    fn target(options: &SftpOptions) -> String {
        format!("{}@{}:{}", options.user, options.host, options.port)
    }

    fn stat(&self, path: &str) -> Result<Option<EntryKind>> {
        match self.sftp.stat(Path::new(path)) {
            Ok(stat) => Ok(Some(kind_of(&stat))),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
            Err(e) => Err(BridgeError::io(format!("Cannot stat {}", path), e)),
        }
    }

    fn lstat(&self, path: &str) -> Result<Option<EntryKind>> {
        match self.sftp.lstat(Path::new(path)) {
            Ok(stat) => Ok(Some(kind_of(&stat))),
            Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) => Ok(None),
            Err(e) => Err(BridgeError::io(format!("Cannot stat {}", path), e)),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let entries = self
            .sftp
            .readdir(Path::new(path))
            .io_context(|| format!("Cannot list {}", path))?;

        Ok(entries
            .into_iter()
            .filter_map(|(entry, stat)| {
                let name = entry.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry {
                    name,
                    kind: kind_of(&stat),
                })
            })
            .collect())
    }

    fn mkdir(&self, path: &str) -> Result<()> {
        self.sftp
            .mkdir(Path::new(path), 0o755)
            .io_context(|| format!("Cannot create directory {}", path))
    }

    fn rmdir(&self, path: &str) -> Result<()> {
        self.sftp
            .rmdir(Path::new(path))
            .io_context(|| format!("Cannot remove directory {}", path))
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.sftp
            .unlink(Path::new(path))
            .io_context(|| format!("Cannot remove file {}", path))
    }

    fn open_read(&self, path: &str) -> Result<ssh2::File> {
        self.sftp
            .open(Path::new(path))
            .io_context(|| format!("Cannot open {}", path))
    }

    fn open_write(&self, path: &str) -> Result<ssh2::File> {
        self.sftp
            .create(Path::new(path))
            .io_context(|| format!("Cannot create {}", path))
    }
}

impl Drop for SftpClient {
    fn drop(&mut self) {
        if let Err(e) = self.session.disconnect(None, "closing connection", None) {
            tracing::warn!("Cannot cleanly disconnect from {}: {}", self.target, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SftpOptions::new("example.com", "deploy");
        assert_eq!(options.port, 22);
        assert_eq!(options.connect_timeout_ms, 120_000);
        assert_eq!(SftpClient::target(&options), "deploy@example.com:22");
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(SftpOptions::new("", "u").validate().is_err());
        assert!(SftpOptions::new("h", "").validate().is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let mut options = SftpOptions::new("h", "u");
        options.password = Some("hunter2".to_string());
        let debug = format!("{:?}", options);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_unreachable_host() {
        let mut options = SftpOptions::new("127.0.0.1", "nobody");
        options.port = 1;
        options.connect_timeout_ms = 500;
        assert!(matches!(
            SftpClient::connect(&options),
            Err(BridgeError::Connection { .. })
        ));
    }

    #[test]
    #[ignore = "requires SFTP_TEST_HOST, SFTP_TEST_USER and SFTP_PASSWORD"]
    fn test_list_root() {
        use crate::storage::{Directory, Endpoint, SftpStore};

        let mut options = SftpOptions::new(
            std::env::var("SFTP_TEST_HOST").unwrap(),
            std::env::var("SFTP_TEST_USER").unwrap(),
        );
        options.password = std::env::var("SFTP_PASSWORD").ok();

        let store = SftpStore::open(options).unwrap();
        assert!(store.directory("/").exists().unwrap());
        store.directory("/").list_sub_directories().unwrap();
    }
}
