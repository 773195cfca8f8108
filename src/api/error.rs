use thiserror::Error;

pub type StorageError = anyhow::Error;

#[derive(Error, Debug)]
pub enum CreateError {
    #[error("the resource {0} already exists")]
    AlreadyExists(String),
    #[error("an error ocurred in the storage backend: {0:#}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum GetError {
    #[error("the resource {0} does not exist")]
    DoesNotExist(String),
    #[error("an error ocurred in the storage backend: {0:#}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("only up to 1000 items can be logged at once, found {0}")]
    ToManyItems(usize),
    #[error("only up to 1000 metrics can be logged at once, found {0}")]
    ToManyMetrics(usize),
    #[error("only up to 100 params can be logged at once, found {0}")]
    ToManyParams(usize),
    #[error("only up to 100 tags can be logged at once, found {0}")]
    ToManyTags(usize),
    #[error("an error ocurred in the storage backend: {0:#}")]
    Storage(#[from] StorageError),
}

pub type DeleteError = GetError;
pub type UpdateError = GetError;
pub type RestoreError = GetError;

/// Batch limits of the `runs/log-batch` endpoint.
pub mod limits {
    pub const BATCH_ITEMS: usize = 1000;
    pub const BATCH_METRICS: usize = 1000;
    pub const BATCH_PARAMS: usize = 100;
    pub const BATCH_TAGS: usize = 100;
}

/// Checks a batch against [`limits`] before it is sent.
pub fn check_batch(metrics: usize, params: usize, tags: usize) -> Result<(), BatchError> {
    if metrics > limits::BATCH_METRICS {
        return Err(BatchError::ToManyMetrics(metrics));
    }
    if params > limits::BATCH_PARAMS {
        return Err(BatchError::ToManyParams(params));
    }
    if tags > limits::BATCH_TAGS {
        return Err(BatchError::ToManyTags(tags));
    }
    let total = metrics + params + tags;
    if total > limits::BATCH_ITEMS {
        return Err(BatchError::ToManyItems(total));
    }
    Ok(())
}
