//! Per-object operation strategies.
//!
//! Each strategy performs the remote side effect for one task. Expected
//! remote conditions (missing object, access denied, unroutable prefix) are
//! returned as `Err`; the worker turns them into failure outcomes.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::config::Config;
use crate::storage::Storage;
use crate::types::error::MoveObjectError;
use crate::types::{ObjectTask, Operation};

pub mod copy;
pub mod delete;
pub mod migrate;
pub mod move_object;

pub use copy::CopyOperation;
pub use delete::DeleteOperation;
pub use migrate::{Destination, MigrateOperation};
pub use move_object::MoveOperation;

#[async_trait]
pub trait ObjectOperation: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, task: &ObjectTask) -> Result<()>;
}

/// Build the strategy for `config.operation`.
///
/// `source` is only read by migrate; every other operation works on `target`.
pub fn build_operation(
    config: &Config,
    target: Storage,
    source: Storage,
) -> Result<Arc<dyn ObjectOperation>> {
    let operation: Arc<dyn ObjectOperation> = match config.operation {
        Operation::Migrate => Arc::new(MigrateOperation::new(config, source, target)),
        Operation::Move => Arc::new(MoveOperation::new(config, target)),
        Operation::Copy => Arc::new(CopyOperation::new(config, target)),
        Operation::Delete => Arc::new(DeleteOperation::new(config, target)),
        Operation::List => {
            return Err(anyhow!(MoveObjectError::InvalidConfig(
                "list has no per-object operation".to_string()
            )));
        }
    };
    Ok(operation)
}

/// Reject an in-place copy, which would make a move delete its only copy.
pub(crate) fn ensure_distinct_destination(key: &str, destination_key: &str) -> Result<()> {
    if key == destination_key {
        return Err(anyhow!(
            "destination key is the same as the source key: {key}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockStorage, init_dummy_tracing_subscriber, make_test_config};
    use std::path::Path;

    #[test]
    fn build_operation_for_each_kind() {
        init_dummy_tracing_subscriber();

        for (operation, name) in [
            (Operation::Migrate, "migrate"),
            (Operation::Move, "move"),
            (Operation::Copy, "copy"),
            (Operation::Delete, "delete"),
        ] {
            let config = make_test_config(operation, Path::new("."));
            let built = build_operation(
                &config,
                Box::new(MockStorage::new()),
                Box::new(MockStorage::new()),
            )
            .unwrap();
            assert_eq!(built.name(), name);
        }
    }

    #[test]
    fn build_operation_rejects_list() {
        init_dummy_tracing_subscriber();

        let config = make_test_config(Operation::List, Path::new("."));
        let result = build_operation(
            &config,
            Box::new(MockStorage::new()),
            Box::new(MockStorage::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn in_place_destination_is_rejected() {
        assert!(ensure_distinct_destination("0/a.txt", "0/a.txt").is_err());
        assert!(ensure_distinct_destination("0/a.txt", "a.txt").is_ok());
    }
}
