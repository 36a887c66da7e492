use attmig_client::ClientError;

use crate::verify::Mismatch;

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("run cancelled")]
    Cancelled,

    #[error("{label} failed after {attempts} attempt(s): {last_error}")]
    AttemptsExhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid migration plan: {0}")]
    InvalidPlan(String),

    #[error(
        "eligible attribute key set mismatch: expected {expected} keys including the required base set, got {actual}"
    )]
    EligibleKeySet { expected: usize, actual: usize },

    #[error(
        "chunk {chunk_index} settlement reverted ({reason}); resume with resume-index {resume_from}"
    )]
    FatalSettlement {
        chunk_index: usize,
        resume_from: usize,
        reason: String,
    },

    #[error("migration verification failed with {} mismatch(es)", .0.len())]
    VerificationMismatch(Vec<Mismatch>),

    #[error("checkpoint store error: {0}")]
    Checkpoint(String),
}
