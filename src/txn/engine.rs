use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Condition;
use super::Request;
use super::Response;
use super::TxnKind;
use crate::store::Connection;
use crate::CommitError;
use crate::Error;
use crate::Guard;
use crate::Operation;
use crate::Result;
use crate::Snapshot;
use crate::Store;
use crate::TraceFlags;
use crate::REVISION_INVALID;

/// One request key, qualified into the connection's namespace
struct Check<'a> {
    key: &'a str,
    full_key: String,
    condition: Condition,
}

impl Store {
    /// Atomically read every key of `request` after checking its conditions.
    ///
    /// Keys found absent (only possible under conditions that tolerate
    /// absence) are omitted from the response.
    pub async fn read_txn(
        &self,
        request: &Request,
    ) -> Result<Response> {
        self.execute(TxnKind::Read, "read_txn", request).await
    }

    /// Atomically write every record of `request` iff all conditions hold.
    ///
    /// Every written key carries the returned revision.
    pub async fn write_txn(
        &self,
        request: &Request,
    ) -> Result<Response> {
        self.execute(TxnKind::Write, "write_txn", request).await
    }

    /// Atomically delete every key of `request` iff all conditions hold
    pub async fn delete_txn(
        &self,
        request: &Request,
    ) -> Result<Response> {
        self.execute(TxnKind::Delete, "delete_txn", request).await
    }

    /// Every key under `prefix`, sorted by key. Not transactional.
    ///
    /// A prefix matching nothing yields an empty response carrying the
    /// store's current revision.
    pub async fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Response> {
        let connection = self.connection()?;
        let flags = self.trace_flags();
        let full_prefix = connection.namespace.qualify(prefix);

        let result = self
            .timed("list_with_prefix", connection.driver.range(&full_prefix))
            .await
            .map(|snapshot| unqualify(&connection, snapshot));

        trace_result(flags, "list_with_prefix", &result);
        result
    }

    /// Delete every key under `prefix`. Not transactional.
    pub async fn delete_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Response> {
        let connection = self.connection()?;
        let flags = self.trace_flags();
        let full_prefix = connection.namespace.qualify(prefix);

        let result = self
            .timed("delete_with_prefix", connection.driver.delete_range(&full_prefix))
            .await
            .map(Response::new);

        trace_result(flags, "delete_with_prefix", &result);
        result
    }

    async fn execute(
        &self,
        kind: TxnKind,
        operation: &'static str,
        request: &Request,
    ) -> Result<Response> {
        let connection = self.connection()?;
        let flags = self.trace_flags();
        trace_request(flags, operation, request);

        let checks: Vec<Check<'_>> = request
            .checks(kind)?
            .into_iter()
            .map(|(key, condition)| Check {
                key,
                full_key: connection.namespace.qualify(key),
                condition,
            })
            .collect();

        let result = self
            .timed(operation, self.commit_checked(&connection, kind, request, &checks))
            .await;

        trace_result(flags, operation, &result);
        result
    }

    /// Prefetch → evaluate → guarded commit, retried while the guards lose
    /// to concurrent writers.
    async fn commit_checked(
        &self,
        connection: &Connection,
        kind: TxnKind,
        request: &Request,
        checks: &[Check<'_>],
    ) -> Result<Response> {
        let prefetch: Vec<String> = checks
            .iter()
            .filter(|c| c.condition.needs_revision())
            .map(|c| c.full_key.clone())
            .collect();

        let ops: Vec<Operation> = checks
            .iter()
            .map(|c| {
                let key = c.full_key.clone();
                match kind {
                    TxnKind::Read => Operation::Get { key },
                    TxnKind::Write => Operation::Put {
                        key,
                        value: request.records.get(c.key).map(|r| r.value.clone()).unwrap_or_default(),
                    },
                    TxnKind::Delete => Operation::Delete { key },
                }
            })
            .collect();

        let attempts = self.max_txn_attempts();
        for attempt in 1..=attempts {
            let snapshot = if prefetch.is_empty() {
                Snapshot::default()
            } else {
                connection.driver.fetch(&prefetch).await?
            };

            let mut guards = Vec::with_capacity(prefetch.len());
            for check in checks.iter().filter(|c| c.condition.needs_revision()) {
                let actual = snapshot
                    .records
                    .get(&check.full_key)
                    .map(|r| r.revision)
                    .unwrap_or(REVISION_INVALID);
                check.condition.evaluate(check.key, actual)?;
                guards.push(Guard {
                    key: check.full_key.clone(),
                    revision: actual,
                });
            }

            let commit = connection.driver.commit(&guards, &ops).await?;
            if commit.succeeded {
                return Ok(unqualify(
                    connection,
                    Snapshot {
                        revision: commit.revision,
                        records: commit.records,
                    },
                ));
            }

            debug!(
                attempt,
                attempts,
                operation = %kind,
                reason = %request.reason,
                revision = commit.revision,
                "Transaction lost a guard to a concurrent writer, retrying"
            );
        }

        let key = checks.first().map(|c| c.key.to_string()).unwrap_or_default();
        warn!(
            attempts,
            operation = %kind,
            reason = %request.reason,
            "Transaction abandoned under contention"
        );
        Err(commit_failure(kind, key))
    }
}

fn commit_failure(
    kind: TxnKind,
    key: String,
) -> Error {
    match kind {
        TxnKind::Read => CommitError::KeyReadFailure { key }.into(),
        TxnKind::Write => CommitError::KeyWriteFailure { key }.into(),
        TxnKind::Delete => CommitError::KeyDeleteFailure { key }.into(),
    }
}

/// Map backing store keys back to the caller's relative keys
fn unqualify(
    connection: &Connection,
    snapshot: Snapshot,
) -> Response {
    let mut response = Response::new(snapshot.revision);
    for (full_key, record) in snapshot.records {
        if let Some(key) = connection.namespace.strip(&full_key) {
            response.records.insert(key.to_string(), record);
        }
    }
    response
}

fn trace_request(
    flags: TraceFlags,
    operation: &'static str,
    request: &Request,
) {
    let keys = flags
        .contains(TraceFlags::KEYS)
        .then(|| request.records.keys().cloned().collect::<Vec<_>>());
    let values = flags
        .contains(TraceFlags::VALUES)
        .then(|| request.records.values().map(|r| r.value.clone()).collect::<Vec<_>>());

    if flags.contains(TraceFlags::EXECUTION) {
        info!(operation, reason = %request.reason, count = request.len(), ?keys, ?values, "Store transaction");
    } else {
        debug!(operation, reason = %request.reason, count = request.len(), ?keys, ?values, "Store transaction");
    }
}

fn trace_result(
    flags: TraceFlags,
    operation: &'static str,
    result: &Result<Response>,
) {
    match result {
        Ok(response) => {
            if flags.contains(TraceFlags::EXECUTION) {
                info!(operation, revision = response.revision, records = response.records.len(), "Store transaction committed");
            } else {
                debug!(operation, revision = response.revision, records = response.records.len(), "Store transaction committed");
            }
            if flags.contains(TraceFlags::EXPAND_RESULTS) {
                for (key, record) in &response.records {
                    let value = flags.contains(TraceFlags::VALUES).then_some(record.value.as_str());
                    info!(operation, key = key.as_str(), revision = record.revision, ?value, "Store record");
                }
            }
        }
        Err(e) => {
            if flags.contains(TraceFlags::EXECUTION) {
                info!(operation, error = %e, "Store transaction failed");
            } else {
                debug!(operation, error = %e, "Store transaction failed");
            }
        }
    }
}
