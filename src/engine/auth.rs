//! Server greeting and chap-sha1 authentication

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use super::error::{EngineError, EngineResult};
use super::protocol::{GREETING_SIZE, SCRAMBLE_SIZE};

/// Parsed server greeting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub version: String,
    pub salt: Vec<u8>,
}

impl Greeting {
    /// Parses the 128-byte greeting: a version line followed by a base64 salt line.
    pub fn parse(raw: &[u8]) -> EngineResult<Self> {
        if raw.len() < GREETING_SIZE {
            return Err(EngineError::protocol(format!(
                "greeting is {} bytes, expected {}",
                raw.len(),
                GREETING_SIZE
            )));
        }

        let half = GREETING_SIZE / 2;
        let version_line = std::str::from_utf8(&raw[..half])
            .map_err(|_| EngineError::protocol("greeting version line is not UTF-8"))?
            .trim_end();
        if !version_line.starts_with("Tarantool") {
            return Err(EngineError::protocol(format!(
                "unexpected greeting: {:?}",
                version_line
            )));
        }

        let salt_line = std::str::from_utf8(&raw[half..GREETING_SIZE])
            .map_err(|_| EngineError::protocol("greeting salt line is not UTF-8"))?
            .trim_end();
        let salt = STANDARD
            .decode(salt_line)
            .map_err(|e| EngineError::protocol(format!("greeting salt is not base64: {}", e)))?;
        if salt.len() < SCRAMBLE_SIZE {
            return Err(EngineError::protocol(format!(
                "greeting salt is {} bytes, expected at least {}",
                salt.len(),
                SCRAMBLE_SIZE
            )));
        }

        Ok(Self {
            version: version_line.to_string(),
            salt,
        })
    }
}

/// chap-sha1 scramble: `sha1(password) XOR sha1(salt[..20] ++ sha1(sha1(password)))`
pub fn scramble(salt: &[u8], password: &str) -> Vec<u8> {
    let step1 = Sha1::digest(password.as_bytes());
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(&salt[..SCRAMBLE_SIZE.min(salt.len())]);
    hasher.update(step2);
    let step3 = hasher.finalize();

    step1.iter().zip(step3.iter()).map(|(a, b)| a ^ b).collect()
}

/// The built-in unauthenticated user
pub fn is_guest(user: &str, password: &str) -> bool {
    user == "guest" && password.is_empty()
}

#[cfg(test)]
pub(crate) fn greeting_bytes(version: &str, salt: &[u8]) -> Vec<u8> {
    let half = GREETING_SIZE / 2;
    let mut raw = format!("{:<width$}", version, width = half - 1).into_bytes();
    raw.push(b'\n');
    let mut salt_line = format!("{:<width$}", STANDARD.encode(salt), width = half - 1).into_bytes();
    salt_line.push(b'\n');
    raw.extend_from_slice(&salt_line);
    raw
}
