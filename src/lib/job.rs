//! ## Jobs
//!
//! [`Job`] is the unit of work pushed by the pool (at login and via `job` notifications) and
//! [`JobResult`] is a solved nonce to submit back.
//!
//! Each setter validates one wire field. The field that fails decides the [`JobError`], whose
//! numeric [`JobError::code`] is what gets logged when a login or a job update is rejected.
use std::fmt;

/// Job ids must be strictly shorter than this.
pub const MAX_JOB_ID_LEN: usize = 64;
/// Decoded blob size bounds, in bytes: `MIN_BLOB_SIZE <= size < MAX_BLOB_SIZE`.
pub const MIN_BLOB_SIZE: usize = 76;
pub const MAX_BLOB_SIZE: usize = 84;
/// Offset of the 32-bit nonce inside the blob.
pub const NONCE_OFFSET: usize = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// Login result carries no usable session id.
    SessionId,
    /// Job parameters are not a JSON object.
    NotAnObject,
    /// `job_id` missing, not a string, or too long.
    JobId,
    /// `blob` missing, not hex, or of the wrong size.
    Blob,
    /// `target` missing, not hex, too long, or zero.
    Target,
}

impl JobError {
    /// Numeric diagnostic code of the failing field.
    pub fn code(&self) -> i32 {
        match self {
            JobError::SessionId => 1,
            JobError::NotAnObject => 2,
            JobError::JobId => 3,
            JobError::Blob => 4,
            JobError::Target => 5,
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = match self {
            JobError::SessionId => "session id",
            JobError::NotAnObject => "job parameters",
            JobError::JobId => "job id",
            JobError::Blob => "job blob",
            JobError::Target => "job target",
        };
        write!(f, "invalid {field} (code {})", self.code())
    }
}

impl std::error::Error for JobError {}

#[derive(Debug, Clone, Default)]
pub struct Job {
    pool_id: u32,
    nicehash: bool,
    id: String,
    blob: Vec<u8>,
    target: u64,
    difficulty: u64,
}

impl Job {
    pub fn new(pool_id: u32, nicehash: bool) -> Self {
        Self {
            pool_id,
            nicehash,
            ..Default::default()
        }
    }

    pub fn set_id(&mut self, id: &str) -> Result<(), JobError> {
        if id.len() >= MAX_JOB_ID_LEN {
            return Err(JobError::JobId);
        }
        self.id = id.to_string();
        Ok(())
    }

    pub fn set_blob(&mut self, blob: &str) -> Result<(), JobError> {
        if blob.len() % 2 != 0 {
            return Err(JobError::Blob);
        }
        let size = blob.len() / 2;
        if !(MIN_BLOB_SIZE..MAX_BLOB_SIZE).contains(&size) {
            return Err(JobError::Blob);
        }
        self.blob = hex::decode(blob).map_err(|_| JobError::Blob)?;

        if self.nonce() != 0 && !self.nicehash {
            self.nicehash = true;
        }
        Ok(())
    }

    /// Accepts a little-endian hex target: up to 8 chars is a compact 32-bit target, up to 16
    /// chars a full 64-bit one.
    pub fn set_target(&mut self, target: &str) -> Result<(), JobError> {
        let target = match target.len() {
            0 => return Err(JobError::Target),
            len if len <= 8 => {
                let compact = u32::from_le_bytes(decode_padded::<4>(target)?);
                if compact == 0 {
                    return Err(JobError::Target);
                }
                u64::MAX / (u64::from(u32::MAX) / u64::from(compact))
            }
            len if len <= 16 => u64::from_le_bytes(decode_padded::<8>(target)?),
            _ => return Err(JobError::Target),
        };
        if target == 0 {
            return Err(JobError::Target);
        }
        self.target = target;
        self.difficulty = u64::MAX / target;
        Ok(())
    }

    pub fn pool_id(&self) -> u32 {
        self.pool_id
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn is_nicehash(&self) -> bool {
        self.nicehash
    }

    /// A job with no id has never been filled from the wire.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.blob.is_empty()
    }

    /// Nonce currently embedded in the blob.
    pub fn nonce(&self) -> u32 {
        self.blob
            .get(NONCE_OFFSET..NONCE_OFFSET + 4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_le_bytes)
            .unwrap_or(0)
    }
}

/// Two jobs are the same job when id, blob and target match.
impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.blob == other.blob && self.target == other.target
    }
}

impl Eq for Job {}

fn decode_padded<const N: usize>(hex_str: &str) -> Result<[u8; N], JobError> {
    let mut padded = String::with_capacity(N * 2);
    padded.push_str(hex_str);
    while padded.len() < N * 2 {
        padded.push('0');
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(&padded, &mut out).map_err(|_| JobError::Target)?;
    Ok(out)
}

/// A solved nonce for a job, ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub pool_id: u32,
    pub job_id: String,
    pub nonce: u32,
    pub result: [u8; 32],
    pub difficulty: u64,
}

impl JobResult {
    pub fn new(job: &Job, nonce: u32, result: [u8; 32]) -> Self {
        Self {
            pool_id: job.pool_id(),
            job_id: job.id().to_string(),
            nonce,
            result,
            difficulty: job.difficulty(),
        }
    }

    /// The nonce's 4 raw (little-endian) bytes as 8 lowercase hex chars.
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce.to_le_bytes())
    }

    /// The 32-byte result hash as 64 lowercase hex chars.
    pub fn result_hex(&self) -> String {
        hex::encode(self.result)
    }
}
