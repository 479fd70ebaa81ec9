use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::error::{Error, ErrorKind, Result};
use crate::utils::split_once;

use super::Mechanism;

/// How long a keyring cookie is considered live past its creation time.
///
/// The reference bus rotates cookies on the order of minutes; anything
/// older than the lifetime plus a grace window is skipped rather than used
/// for a doomed handshake.
const COOKIE_LIFETIME: Duration = Duration::from_secs(7 * 60);
const COOKIE_GRACE: Duration = Duration::from_secs(5 * 60);

/// DBUS_COOKIE_SHA1: prove identity by hashing a challenge together with a
/// cookie only readable from the user's home directory.
pub(crate) struct CookieSha1 {
    identity: Vec<u8>,
    keyring_dir: Option<PathBuf>,
}

impl CookieSha1 {
    pub(crate) fn new() -> Self {
        let identity = env::var("USER")
            .map(String::into_bytes)
            .unwrap_or_else(|_| current_uid_bytes());

        Self {
            identity,
            keyring_dir: None,
        }
    }

    /// Override the keyring directory, rather than deriving it from
    /// `$HOME/.dbus-keyrings`.
    #[cfg(test)]
    pub(crate) fn with_keyring_dir(mut self, dir: PathBuf) -> Self {
        self.keyring_dir = Some(dir);
        self
    }

    fn keyring_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.keyring_dir {
            return Ok(dir.clone());
        }

        let Some(home) = env::var_os("HOME") else {
            return Err(Error::new(ErrorKind::CookieUnavailable));
        };

        Ok(PathBuf::from(home).join(".dbus-keyrings"))
    }

    /// Look up the cookie `id` in the keyring file for `context`.
    fn find_cookie(&self, context: &[u8], id: &[u8]) -> Result<Vec<u8>> {
        let context = std::str::from_utf8(context)
            .map_err(|_| Error::new(ErrorKind::CookieUnavailable))?;

        // Context names become file names; reject anything that could
        // escape the keyring directory.
        if context.is_empty() || context.contains(['/', '\\']) || context.contains('\0') {
            return Err(Error::new(ErrorKind::CookieUnavailable));
        }

        let dir = self.keyring_dir()?;
        check_dir_permissions(&dir)?;

        let file = dir.join(context);
        check_file_permissions(&file)?;

        let contents =
            fs::read(&file).map_err(|_| Error::new(ErrorKind::CookieUnavailable))?;

        for line in contents.split(|&b| b == b'\n') {
            let Some((line_id, rest)) = split_once(line, b' ') else {
                continue;
            };

            let Some((created, cookie)) = split_once(rest, b' ') else {
                continue;
            };

            if line_id != id {
                continue;
            }

            if !cookie_is_fresh(created) {
                return Err(Error::new(ErrorKind::CookieUnavailable));
            }

            return Ok(cookie.to_vec());
        }

        Err(Error::new(ErrorKind::CookieUnavailable))
    }
}

impl Mechanism for CookieSha1 {
    fn name(&self) -> &'static str {
        "DBUS_COOKIE_SHA1"
    }

    fn initial_response(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.identity.clone()))
    }

    /// The server challenge is `context SPACE id SPACE server-challenge`;
    /// the answer is `client-challenge SPACE sha1-hex` where the digest
    /// covers `server-challenge:client-challenge:cookie`.
    fn challenge(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let Some((context, rest)) = split_once(data, b' ') else {
            return Err(Error::new(ErrorKind::AuthProtocolViolation));
        };

        let Some((id, server_challenge)) = split_once(rest, b' ') else {
            return Err(Error::new(ErrorKind::AuthProtocolViolation));
        };

        if server_challenge.is_empty() {
            return Err(Error::new(ErrorKind::AuthProtocolViolation));
        }

        let cookie = self.find_cookie(context, id)?;

        let mut random = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random);
        let client_challenge = hex::encode(random);

        let mut hasher = Sha1::new();
        hasher.update(server_challenge);
        hasher.update(b":");
        hasher.update(client_challenge.as_bytes());
        hasher.update(b":");
        hasher.update(&cookie);
        let digest = hex::encode(hasher.finalize());

        let mut response = client_challenge.into_bytes();
        response.push(b' ');
        response.extend_from_slice(digest.as_bytes());
        Ok(response)
    }
}

fn current_uid_bytes() -> Vec<u8> {
    #[cfg(unix)]
    {
        // SAFETY: getuid has no failure modes.
        let uid = unsafe { libc::getuid() };
        uid.to_string().into_bytes()
    }
    #[cfg(not(unix))]
    {
        Vec::new()
    }
}

/// The keyring directory must be mode 0700, private to its owner.
#[cfg(unix)]
fn check_dir_permissions(dir: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let metadata =
        fs::metadata(dir).map_err(|_| Error::new(ErrorKind::CookieUnavailable))?;

    if !metadata.is_dir() || metadata.mode() & 0o077 != 0 {
        return Err(Error::new(ErrorKind::CookieUnavailable));
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_dir_permissions(_: &std::path::Path) -> Result<()> {
    Ok(())
}

/// Cookie files must be mode 0600; a group- or world-readable cookie is
/// no secret and must not be used to authenticate.
#[cfg(unix)]
fn check_file_permissions(file: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;

    let metadata =
        fs::metadata(file).map_err(|_| Error::new(ErrorKind::CookieUnavailable))?;

    if !metadata.is_file() || metadata.mode() & 0o077 != 0 {
        return Err(Error::new(ErrorKind::CookieUnavailable));
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_file_permissions(_: &std::path::Path) -> Result<()> {
    Ok(())
}

/// A creation timestamp is fresh when it is within the cookie lifetime
/// plus a grace window, with a small allowance for clock skew into the
/// future.
fn cookie_is_fresh(created: &[u8]) -> bool {
    let Ok(created) = std::str::from_utf8(created) else {
        return false;
    };

    let Ok(created) = created.trim().parse::<u64>() else {
        return false;
    };

    let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return false;
    };

    let now = now.as_secs();
    let limit = (COOKIE_LIFETIME + COOKIE_GRACE).as_secs();

    created <= now.saturating_add(60) && now.saturating_sub(created) <= limit
}
