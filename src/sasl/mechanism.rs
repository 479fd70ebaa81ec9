use crate::error::{Error, ErrorKind, Result};

/// A client-side SASL mechanism.
///
/// The engine hex-encodes whatever a mechanism produces before it goes on
/// the wire, so implementations deal in raw bytes.
pub(crate) trait Mechanism: Send {
    /// The mechanism name as advertised in the `AUTH` command.
    fn name(&self) -> &'static str;

    /// The initial response sent inline with `AUTH`, if any.
    fn initial_response(&mut self) -> Result<Option<Vec<u8>>>;

    /// Answer a server challenge.
    fn challenge(&mut self, data: &[u8]) -> Result<Vec<u8>>;
}

/// EXTERNAL: the transport already proves our identity, so the initial
/// response is just the process uid in decimal ASCII.
pub(crate) struct External {
    identity: Vec<u8>,
}

impl External {
    #[cfg(unix)]
    pub(crate) fn from_current_uid() -> Self {
        // SAFETY: getuid has no failure modes.
        let uid = unsafe { libc::getuid() };

        Self {
            identity: uid.to_string().into_bytes(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_identity(identity: &[u8]) -> Self {
        Self {
            identity: identity.to_vec(),
        }
    }
}

impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn initial_response(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.identity.clone()))
    }

    fn challenge(&mut self, _: &[u8]) -> Result<Vec<u8>> {
        // EXTERNAL has no challenge phase.
        Err(Error::new(ErrorKind::AuthProtocolViolation))
    }
}

/// ANONYMOUS: no identity at all, only an opaque trace string.
pub(crate) struct Anonymous;

impl Mechanism for Anonymous {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn initial_response(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(Some(b"busline".to_vec()))
    }

    fn challenge(&mut self, _: &[u8]) -> Result<Vec<u8>> {
        Err(Error::new(ErrorKind::AuthProtocolViolation))
    }
}
