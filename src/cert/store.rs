//! On-disk persistence of fetched certificate and key material

use anyhow::{anyhow, bail, Context, Result};
use nix::unistd::{chown, Gid, Group, Uid, User};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::provider::CertificateBundle;

/// Mode for certificate and key files
const FILE_MODE: u32 = 0o600;

/// Group half of an `owner[:group]` spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSpec {
    /// `user:` - use the user's primary group
    UserDefault,
    /// `user:group` - a group name or numeric gid
    Named(String),
}

/// Ownership to apply to written files, parsed from `user[:group]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub user: String,
    pub group: Option<GroupSpec>,
}

impl FromStr for Ownership {
    type Err = anyhow::Error;

    fn from_str(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() > 2 {
            bail!("Only one colon allowed in owner spec: {}", spec);
        }
        if parts[0].is_empty() {
            bail!("Owner spec must name a user: {}", spec);
        }

        let group = match parts.get(1) {
            None => None,
            Some(&"") => Some(GroupSpec::UserDefault),
            Some(group) => Some(GroupSpec::Named(group.to_string())),
        };

        Ok(Self {
            user: parts[0].to_string(),
            group,
        })
    }
}

impl Ownership {
    /// Resolve names through the platform user database
    pub fn resolve(&self) -> Result<(Uid, Option<Gid>)> {
        let (uid, user) = match self.user.parse::<u32>() {
            Ok(raw) => {
                let uid = Uid::from_raw(raw);
                // A numeric uid with no passwd entry is still usable on its own
                let user = User::from_uid(uid)
                    .with_context(|| format!("Failed to look up uid {}", raw))?;
                (uid, user)
            }
            Err(_) => {
                let user = User::from_name(&self.user)
                    .with_context(|| format!("Failed to look up user {}", self.user))?
                    .ok_or_else(|| anyhow!("Unknown user: {}", self.user))?;
                (user.uid, Some(user))
            }
        };

        let gid = match &self.group {
            None => None,
            Some(GroupSpec::UserDefault) => match &user {
                Some(user) => Some(user.gid),
                None => bail!("uid {} has no passwd entry to take a default group from", uid),
            },
            Some(GroupSpec::Named(group)) => match group.parse::<u32>() {
                Ok(gid) => Some(Gid::from_raw(gid)),
                Err(_) => Some(
                    Group::from_name(group)
                        .with_context(|| format!("Failed to look up group {}", group))?
                        .ok_or_else(|| anyhow!("Unknown group: {}", group))?
                        .gid,
                ),
            },
        };

        Ok((uid, gid))
    }

    /// Change owner (and group, when given) of every path
    pub fn apply(&self, paths: &[&Path]) -> Result<()> {
        let (uid, gid) = self.resolve()?;
        for path in paths {
            chown(*path, Some(uid), gid)
                .with_context(|| format!("Failed to chown {}", path.display()))?;
            debug!("Set owner of {} to {}:{:?}", path.display(), uid, gid);
        }
        Ok(())
    }
}

/// Where fetched material is written and read back from
#[derive(Debug, Clone)]
pub struct CertificateStore {
    cert_path: PathBuf,
    key_path: Option<PathBuf>,
    owner: Option<Ownership>,
}

impl CertificateStore {
    pub fn new(cert_path: PathBuf, key_path: Option<PathBuf>, owner: Option<Ownership>) -> Self {
        Self {
            cert_path,
            key_path,
            owner,
        }
    }

    /// Write the bundle and hand the files to the configured owner
    pub fn persist(&self, bundle: &CertificateBundle) -> Result<()> {
        write_private_file(&self.cert_path, &bundle.cert)?;

        let mut written = vec![self.cert_path.as_path()];
        match &self.key_path {
            Some(key_path) => {
                write_private_file(key_path, &bundle.key)?;
                written.push(key_path.as_path());
            }
            None => debug!("No key path configured, private key not written"),
        }

        if let Some(owner) = &self.owner {
            owner.apply(&written)?;
        }

        info!(
            "Stored certificate at {}{}",
            self.cert_path.display(),
            self.key_path
                .as_ref()
                .map(|p| format!(" and key at {}", p.display()))
                .unwrap_or_default()
        );

        Ok(())
    }

    /// Read the persisted certificate PEM
    pub fn read_certificate(&self) -> Result<Vec<u8>> {
        fs::read(&self.cert_path)
            .with_context(|| format!("Failed to read certificate file: {}", self.cert_path.display()))
    }
}

/// Write `contents` to `path` readable by the owner only
pub fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    // `mode` only applies on creation; tighten files that already existed
    file.set_permissions(fs::Permissions::from_mode(FILE_MODE))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

    file.write_all(contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
