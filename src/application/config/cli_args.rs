use std::num::NonZero;
use std::time::Duration;

use clap::Parser;

use crate::application::network::framing::MAX_TASK_FRAME_LENGTH_IN_BYTES;

/// Connection and dispatch settings shared by every Caller and Runner.
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Seconds to wait for the other side's handshake before giving up on a
    /// freshly opened connection.
    #[clap(long, default_value = "4", value_parser = duration_from_seconds_str)]
    pub handshake_timeout: Duration,

    /// Largest accepted frame, in bytes. A frame carries one message, so
    /// this bounds the size of job arguments, progress payloads and results.
    #[clap(long, default_value_t = MAX_TASK_FRAME_LENGTH_IN_BYTES)]
    pub max_frame_length: usize,

    /// Delay before the first reconnection attempt after a dialed connection
    /// is lost or cannot be established, e.g. "500ms" or "1s".
    ///
    /// Each failed attempt doubles the delay, up to
    /// `--reconnection-delay-max`. A successful connection resets it.
    #[clap(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub reconnection_delay: Duration,

    /// Upper bound for the reconnection delay.
    #[clap(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub reconnection_delay_max: Duration,

    /// Number of jobs an accepting Caller dispatches to one Runner connection
    /// at a time. A Runner gets its next job when one of its jobs settles.
    #[clap(long, default_value = "1")]
    pub max_jobs_per_runner: NonZero<usize>,

    /// Stop executing a job when the connection that requested it is lost.
    ///
    /// By default the work runs to completion and its outcome is dropped,
    /// since the Caller will redeliver the job elsewhere.
    #[clap(long, default_value = "false")]
    pub abandon_work_on_disconnect: bool,
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}

impl Args {
    /// The delay to wait after the given number of consecutive failed
    /// connection attempts.
    pub fn reconnection_backoff(&self, consecutive_failures: u32) -> Duration {
        let factor = 1u32.checked_shl(consecutive_failures).unwrap_or(u32::MAX);
        self.reconnection_delay
            .saturating_mul(factor)
            .min(self.reconnection_delay_max)
    }
}

fn duration_from_seconds_str(s: &str) -> Result<Duration, std::num::ParseIntError> {
    Ok(Duration::from_secs(s.parse()?))
}
