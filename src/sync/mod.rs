use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db;
use crate::identity;
use crate::outbox::{self, OutboxError, OutboxOp};
use crate::remote::{RemoteError, RemoteStore};

/// What happened when one op was attempted, before any queue bookkeeping.
#[derive(Debug)]
pub enum Attempt {
    /// The remote effect is confirmed applied.
    Succeeded,
    /// The remote rejected the request; it can never succeed as issued.
    Rejected(RemoteError),
    /// The remote or the network failed in a way retrying may fix.
    Failed(RemoteError),
    /// A create acknowledged without a server id; indistinguishable from
    /// not-yet-created for every later op, so treated as retryable.
    SucceededWithoutId,
    /// Target id unknown while its sibling create is still pending.
    AwaitingIdentity,
    /// Target can never exist server-side; the intent is moot.
    Vacuous,
}

/// Three-way classification of an attempt. Pure, so the queue policy is
/// testable without a database or a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done with this intent, for good or ill: remove it from the outbox.
    Settled,
    /// Not attemptable yet; leave it queued, untouched.
    Deferred,
    /// Attempted and failed transiently; leave it queued for the next pass.
    Retry,
}

pub fn disposition_for(attempt: &Attempt) -> Disposition {
    match attempt {
        Attempt::Succeeded | Attempt::Rejected(_) | Attempt::Vacuous => Disposition::Settled,
        Attempt::Failed(_) | Attempt::SucceededWithoutId => Disposition::Retry,
        Attempt::AwaitingIdentity => Disposition::Deferred,
    }
}

fn split_remote_outcome(err: RemoteError) -> Attempt {
    if err.is_rejection() {
        Attempt::Rejected(err)
    } else {
        Attempt::Failed(err)
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    /// Ops in the snapshot this pass worked through.
    pub attempted: u64,
    /// Remote calls that succeeded.
    pub succeeded: u64,
    /// Ops the remote rejected as unfixable (4xx); removed without effect.
    pub rejected: u64,
    /// Vacuous ops dropped without a remote call.
    pub discarded: u64,
    /// Ops still waiting on a sibling create; untouched.
    pub deferred: u64,
    /// Ops that failed transiently; untouched, retried next pass.
    pub retried: u64,
    /// Outbox length after settled ops were pruned.
    pub remaining: u64,
}

impl SyncSummary {
    pub fn drained(&self) -> bool {
        self.remaining == 0
    }
}

/// Guards the single-flight invariant: only one reconciliation pass may run
/// at a time, and a request to start while one is in flight is dropped, not
/// queued.
#[derive(Debug, Default)]
pub struct SyncGate {
    in_flight: AtomicBool,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self) -> Option<SyncInFlight<'_>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(SyncInFlight { gate: self })
        } else {
            None
        }
    }
}

pub struct SyncInFlight<'a> {
    gate: &'a SyncGate,
}

impl Drop for SyncInFlight<'_> {
    fn drop(&mut self) {
        self.gate.in_flight.store(false, Ordering::Release);
    }
}

/// Where an update/delete should land, after consulting its own server id
/// and the identity map.
enum Target {
    Resolved(String),
    Waiting,
    Unresolvable,
}

pub struct SyncService<'a> {
    conn: &'a Connection,
    remote: &'a dyn RemoteStore,
}

impl<'a> SyncService<'a> {
    pub fn new(conn: &'a Connection, remote: &'a dyn RemoteStore) -> Self {
        Self { conn, remote }
    }

    /// Drains the outbox snapshot taken on entry. The caller asserts
    /// reachability; this never probes connectivity itself. Ops enqueued
    /// while the pass runs are left for the next trigger.
    pub fn reconcile(&self) -> Result<SyncSummary, SyncError> {
        let ops = outbox::list(self.conn)?;
        if ops.is_empty() {
            return Ok(SyncSummary::default());
        }

        let mut summary = SyncSummary {
            attempted: ops.len() as u64,
            ..SyncSummary::default()
        };

        // Creates not yet known to have settled; their dependents defer.
        let mut pending_creates: HashSet<String> = ops
            .iter()
            .filter_map(|op| match op {
                OutboxOp::Create { client_id, .. } => Some(client_id.clone()),
                _ => None,
            })
            .collect();
        // Creates the remote rejected this pass; their dependents are moot.
        let mut dead_creates: HashSet<String> = HashSet::new();
        let mut settled_ids: Vec<String> = Vec::new();

        for op in &ops {
            let attempt = self.attempt_op(op, &mut pending_creates, &mut dead_creates)?;

            match &attempt {
                Attempt::Succeeded => summary.succeeded += 1,
                Attempt::Rejected(err) => {
                    warn!(op = %op.id(), error = %err, "remote rejected op; dropping intent");
                    summary.rejected += 1;
                }
                Attempt::Vacuous => summary.discarded += 1,
                _ => {}
            }

            match disposition_for(&attempt) {
                Disposition::Settled => settled_ids.push(op.id().to_string()),
                Disposition::Deferred => {
                    debug!(op = %op.id(), "deferred until its create settles");
                    summary.deferred += 1;
                }
                Disposition::Retry => {
                    debug!(op = %op.id(), "kept queued for the next pass");
                    summary.retried += 1;
                }
            }
        }

        outbox::remove(self.conn, &settled_ids)?;
        summary.remaining = outbox::len(self.conn)?;
        Ok(summary)
    }

    fn attempt_op(
        &self,
        op: &OutboxOp,
        pending_creates: &mut HashSet<String>,
        dead_creates: &mut HashSet<String>,
    ) -> Result<Attempt, SyncError> {
        match op {
            OutboxOp::Create {
                id,
                client_id,
                payload,
                ..
            } => {
                if let Some(server_id) = identity::get_mapping(self.conn, client_id)? {
                    // An earlier pass created this record and crashed before
                    // pruning the op. Do not create twice.
                    debug!(op = %id, client_id = %client_id, "create already mapped; settling without remote call");
                    db::rekey_task(self.conn, client_id, &server_id)?;
                    pending_creates.remove(client_id);
                    return Ok(Attempt::Succeeded);
                }

                match self.remote.create(payload) {
                    Ok(receipt) => match receipt.server_id.as_deref() {
                        Some(server_id) => {
                            self.commit_created_identity(client_id, server_id)?;
                            pending_creates.remove(client_id);
                            Ok(Attempt::Succeeded)
                        }
                        None => {
                            // Settling here would strand the temp id with
                            // no way to ever update or delete remotely.
                            warn!(op = %id, client_id = %client_id, "create succeeded without a server id; will retry");
                            Ok(Attempt::SucceededWithoutId)
                        }
                    },
                    Err(err) => {
                        if err.is_rejection() {
                            pending_creates.remove(client_id);
                            dead_creates.insert(client_id.clone());
                        }
                        Ok(split_remote_outcome(err))
                    }
                }
            }
            OutboxOp::Update {
                id,
                server_id,
                client_id,
                payload,
                ..
            } => {
                match self.resolve_target(
                    server_id.as_deref(),
                    client_id.as_deref(),
                    pending_creates,
                    dead_creates,
                )? {
                    Target::Resolved(target) => match self.remote.update(&target, payload) {
                        Ok(()) => Ok(Attempt::Succeeded),
                        Err(err) => Ok(split_remote_outcome(err)),
                    },
                    Target::Waiting => Ok(Attempt::AwaitingIdentity),
                    Target::Unresolvable => {
                        // The create this update depends on will never
                        // happen; keeping the op would pin the outbox
                        // forever.
                        warn!(op = %id, "update target can never exist; discarding");
                        Ok(Attempt::Vacuous)
                    }
                }
            }
            OutboxOp::Delete {
                id,
                server_id,
                client_id,
                ..
            } => {
                match self.resolve_target(
                    server_id.as_deref(),
                    client_id.as_deref(),
                    pending_creates,
                    dead_creates,
                )? {
                    Target::Resolved(target) => match self.remote.delete(&target) {
                        Ok(()) => {
                            db::delete_task(self.conn, &target)?;
                            Ok(Attempt::Succeeded)
                        }
                        Err(err) => {
                            if err.is_rejection() {
                                // Already gone remotely; drop our copy too.
                                db::delete_task(self.conn, &target)?;
                            }
                            Ok(split_remote_outcome(err))
                        }
                    },
                    Target::Waiting => Ok(Attempt::AwaitingIdentity),
                    Target::Unresolvable => {
                        // Nothing was ever created server-side, so the
                        // delete is vacuously satisfied.
                        debug!(op = %id, "delete target never existed; discarding");
                        if let Some(client_id) = client_id.as_deref() {
                            db::delete_task(self.conn, client_id)?;
                        }
                        Ok(Attempt::Vacuous)
                    }
                }
            }
        }
    }

    /// Mapping and store rekey commit together, before the outbox entry is
    /// pruned. A crash after this point replays the create as a mapped
    /// no-op instead of duplicating it remotely.
    fn commit_created_identity(&self, client_id: &str, server_id: &str) -> Result<(), SyncError> {
        let tx = self.conn.unchecked_transaction()?;
        identity::set_mapping(&tx, client_id, server_id)?;
        db::rekey_task_in(&tx, client_id, server_id)?;
        tx.commit()?;
        Ok(())
    }

    fn resolve_target(
        &self,
        server_id: Option<&str>,
        client_id: Option<&str>,
        pending_creates: &HashSet<String>,
        dead_creates: &HashSet<String>,
    ) -> Result<Target, SyncError> {
        if let Some(server_id) = server_id {
            return Ok(Target::Resolved(server_id.to_string()));
        }
        let Some(client_id) = client_id else {
            return Ok(Target::Unresolvable);
        };
        if let Some(server_id) = identity::get_mapping(self.conn, client_id)? {
            return Ok(Target::Resolved(server_id));
        }
        if dead_creates.contains(client_id) {
            return Ok(Target::Unresolvable);
        }
        if pending_creates.contains(client_id) {
            return Ok(Target::Waiting);
        }
        Ok(Target::Unresolvable)
    }
}

#[derive(Debug)]
pub enum SyncError {
    Db(rusqlite::Error),
    Outbox(OutboxError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Db(err) => write!(f, "sync database error: {}", err),
            SyncError::Outbox(err) => write!(f, "sync outbox error: {}", err),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::Db(err) => Some(err),
            SyncError::Outbox(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(value: rusqlite::Error) -> Self {
        SyncError::Db(value)
    }
}

impl From<OutboxError> for SyncError {
    fn from(value: OutboxError) -> Self {
        SyncError::Outbox(value)
    }
}
