use polaris_types::{
    AtomicOperation, BatchOperation, BatchOperationResult, Did, Operation, TransformBatch,
    TransformBatchResult,
};
use uuid::Uuid;

use crate::engine::{report, TransformEngine};
use crate::error::{EngineError, EngineResult};

/// Applies transform batches, either as one atomic remove/insert pair or as
/// independent operations in order.
#[derive(Clone, Debug)]
pub struct BatchProcessor {
    engine: TransformEngine,
    max_operations: usize,
}

impl BatchProcessor {
    pub fn new(engine: TransformEngine, max_operations: usize) -> Self {
        Self {
            engine,
            max_operations,
        }
    }

    /// Apply `batch` on behalf of `device`.
    ///
    /// Returns `Err` only when the batch itself is malformed. Failures of
    /// individual operations are reported inside the result.
    pub fn apply(&self, device: &Did, batch: &TransformBatch) -> EngineResult<TransformBatchResult> {
        if batch.operations.len() > self.max_operations {
            return Err(EngineError::BadArgs(format!(
                "batch holds {} operations, limit is {}",
                batch.operations.len(),
                self.max_operations
            )));
        }
        if batch.atomic {
            check_atomic_pair(&batch.operations)?;
            Ok(self.apply_atomic(device, &batch.operations))
        } else {
            Ok(self.apply_sequential(device, &batch.operations))
        }
    }

    /// Both operations in one transaction under one atomic id. Any failure
    /// rolls back both and yields a single failure entry.
    fn apply_atomic(&self, device: &Did, operations: &[BatchOperation]) -> TransformBatchResult {
        if let Err(err) = operations
            .iter()
            .try_for_each(|entry| entry.operation.validate())
        {
            let err = EngineError::from(err);
            return TransformBatchResult {
                results: vec![BatchOperationResult::failure(err.code(), err.client_message())],
            };
        }

        let id = Uuid::new_v4().to_string();
        let total = operations.len() as u32;
        let outcome = self.engine.in_transaction(|txn| {
            let mut results = Vec::with_capacity(operations.len());
            for (index, entry) in operations.iter().enumerate() {
                let atomic = AtomicOperation {
                    id: id.clone(),
                    index: index as u32,
                    total,
                };
                let result = self.engine.apply_in(
                    txn,
                    device,
                    &entry.oid,
                    &entry.operation,
                    Some(atomic),
                );
                report(device, &entry.oid, &entry.operation, &result);
                results.push(result?);
            }
            Ok(results)
        });

        match outcome {
            Ok(results) => {
                tracing::debug!(%device, atomic_id = %id, "atomic pair applied");
                TransformBatchResult {
                    results: results
                        .into_iter()
                        .map(|r| BatchOperationResult::success(r.updated))
                        .collect(),
                }
            }
            Err(err) => TransformBatchResult {
                results: vec![BatchOperationResult::failure(err.code(), err.client_message())],
            },
        }
    }

    /// One transaction per operation; stops at the first failure. Earlier
    /// operations stay committed.
    fn apply_sequential(&self, device: &Did, operations: &[BatchOperation]) -> TransformBatchResult {
        let mut results = Vec::with_capacity(operations.len());
        for entry in operations {
            match self.engine.apply(device, &entry.oid, &entry.operation) {
                Ok(result) => results.push(BatchOperationResult::success(result.updated)),
                Err(err) => {
                    results.push(BatchOperationResult::failure(err.code(), err.client_message()));
                    break;
                }
            }
        }
        TransformBatchResult { results }
    }
}

/// An atomic batch must be exactly one REMOVE_CHILD and one INSERT_CHILD
/// naming the same child.
fn check_atomic_pair(operations: &[BatchOperation]) -> EngineResult<()> {
    let [first, second] = operations else {
        return Err(EngineError::BadArgs(format!(
            "atomic batches hold exactly 2 operations, got {}",
            operations.len()
        )));
    };
    let (removed, inserted) = match (&first.operation, &second.operation) {
        (Operation::RemoveChild { child: r }, Operation::InsertChild { child: i, .. })
        | (Operation::InsertChild { child: i, .. }, Operation::RemoveChild { child: r }) => (r, i),
        _ => {
            return Err(EngineError::BadArgs(
                "atomic batches pair one REMOVE_CHILD with one INSERT_CHILD".into(),
            ))
        }
    };
    if removed != inserted {
        return Err(EngineError::BadArgs(
            "atomic pair must name the same child".into(),
        ));
    }
    Ok(())
}
