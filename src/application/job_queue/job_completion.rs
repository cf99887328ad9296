use serde_json::Value;

use super::errors::JobHandleError;

/// represents completion state of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobCompletion {
    /// The remote work succeeded with this value.
    Resolved(Value),
    /// The remote work failed with this value.
    Rejected(Value),
    /// The caller was closed before the job settled.
    Cancelled,
}

impl std::fmt::Display for JobCompletion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let str = match self {
            Self::Resolved(_) => "Resolved",
            Self::Rejected(_) => "Rejected",
            Self::Cancelled => "Cancelled",
        };

        write!(f, "{}", str)
    }
}

impl JobCompletion {
    pub fn result(self) -> Result<Value, JobHandleError> {
        match self {
            JobCompletion::Resolved(v) => Ok(v),
            JobCompletion::Rejected(e) => Err(JobHandleError::JobRejected(e)),
            JobCompletion::Cancelled => Err(JobHandleError::JobCancelled),
        }
    }
}

impl TryFrom<JobCompletion> for Value {
    type Error = JobHandleError;

    fn try_from(jc: JobCompletion) -> Result<Self, Self::Error> {
        jc.result()
    }
}
