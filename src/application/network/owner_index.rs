use std::collections::HashMap;

use itertools::Itertools;
use tracing::trace;

use super::connection::ConnectionId;
use crate::application::job_queue::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("job {id} is owned by {owner}, refusing ownership by {requested}")]
pub struct DuplicateOwnershipError {
    pub id: JobId,
    pub owner: ConnectionId,
    pub requested: ConnectionId,
}

/// Which connection is responsible for which job.
///
/// For every connection the index holds the jobs it currently owns, each with
/// a handle of type `H` (whatever the owning side needs to act on the job
/// later). A job id is owned by at most one connection at any instant.
#[derive(Debug)]
pub struct OwnerIndex<H> {
    owners: HashMap<JobId, ConnectionId>,
    by_connection: HashMap<ConnectionId, HashMap<JobId, H>>,
}

impl<H> Default for OwnerIndex<H> {
    fn default() -> Self {
        Self {
            owners: HashMap::new(),
            by_connection: HashMap::new(),
        }
    }
}

impl<H> OwnerIndex<H> {
    /// records that `connection` owns job `id`.
    ///
    /// Re-registering on the same connection replaces the handle.
    pub fn register(
        &mut self,
        connection: ConnectionId,
        id: JobId,
        handle: H,
    ) -> Result<(), DuplicateOwnershipError> {
        if let Some(owner) = self.owners.get(&id) {
            if *owner != connection {
                return Err(DuplicateOwnershipError {
                    id,
                    owner: *owner,
                    requested: connection,
                });
            }
        }

        self.owners.insert(id, connection);
        self.by_connection
            .entry(connection)
            .or_default()
            .insert(id, handle);
        trace!("{connection} now owns job {id}");

        Ok(())
    }

    /// removes ownership of `id` by `connection`, returning the handle.
    ///
    /// A no-op if the job is absent or owned by another connection.
    pub fn unregister(&mut self, connection: ConnectionId, id: JobId) -> Option<H> {
        if !self.is_owned_by(connection, id) {
            return None;
        }

        self.owners.remove(&id);
        let jobs = self.by_connection.get_mut(&connection)?;
        let handle = jobs.remove(&id);
        if jobs.is_empty() {
            self.by_connection.remove(&connection);
        }

        handle
    }

    /// removes and returns every id owned by `connection`, in id order.
    ///
    /// A second call for the same connection returns nothing.
    pub fn on_disconnect(&mut self, connection: ConnectionId) -> Vec<JobId> {
        self.drain(connection).into_iter().map(|(id, _)| id).collect()
    }

    /// like [Self::on_disconnect], but hands back the handles too.
    pub fn drain(&mut self, connection: ConnectionId) -> Vec<(JobId, H)> {
        let Some(jobs) = self.by_connection.remove(&connection) else {
            return vec![];
        };

        for id in jobs.keys() {
            self.owners.remove(id);
        }
        if !jobs.is_empty() {
            trace!("{connection} released {} job(s)", jobs.len());
        }

        jobs.into_iter().sorted_by_key(|(id, _)| *id).collect()
    }

    pub fn owner_of(&self, id: JobId) -> Option<ConnectionId> {
        self.owners.get(&id).copied()
    }

    pub fn is_owned_by(&self, connection: ConnectionId, id: JobId) -> bool {
        self.owner_of(id) == Some(connection)
    }

    /// the handle `connection` holds for `id`.
    pub fn lookup(&self, connection: ConnectionId, id: JobId) -> Option<&H> {
        self.by_connection.get(&connection)?.get(&id)
    }

    pub fn owned_count(&self, connection: ConnectionId) -> usize {
        self.by_connection.get(&connection).map_or(0, HashMap::len)
    }

    /// total number of owned jobs across all connections.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
