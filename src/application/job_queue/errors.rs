use serde_json::Value;

/// a job-handle error.
#[derive(Debug, thiserror::Error)]
pub enum JobHandleError {
    /// the remote work failed. holds exactly the value it failed with.
    #[error("the job was rejected: {0}")]
    JobRejected(Value),

    #[error("the job was cancelled")]
    JobCancelled,

    #[error("channel recv error waiting for job results: {0}")]
    JobResultError(#[from] tokio::sync::oneshot::error::RecvError),
}

impl JobHandleError {
    /// Returns true if the remote work failed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::JobRejected(_))
    }

    /// returns the value the remote work failed with, if any.
    pub fn rejection(&self) -> Option<&Value> {
        match self {
            Self::JobRejected(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the `JobHandleError`, returning the rejection value if the
    /// remote work failed. Otherwise, self is returned.
    pub fn try_into_rejection(self) -> Result<Value, Self> {
        match self {
            Self::JobRejected(value) => Ok(value),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum AddJobError {
    #[error("every job identifier is in use")]
    IdSpaceExhausted,

    #[error("the caller has been closed")]
    CallerClosed,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn rejection_value_is_not_reinterpreted() {
        let err = JobHandleError::JobRejected(json!({"code": 7}));
        assert!(err.is_rejection());
        assert_eq!(Some(&json!({"code": 7})), err.rejection());
        assert_eq!(json!({"code": 7}), err.try_into_rejection().unwrap());
    }

    #[test]
    fn cancelled_is_not_a_rejection() {
        let err = JobHandleError::JobCancelled;
        assert!(!err.is_rejection());
        assert!(err.try_into_rejection().is_err());
    }
}
