//! Housekeeping on experiments: clearing, deleting and restoring them.

use crate::{
    api::{
        client::{list_experiments, list_runs, ViewType},
        error::GetError,
        experiment::Experiment,
    },
    transfer::{
        error::{Error, Result},
        resolver::resolve_source,
    },
    Client, ExperimentId,
};

/// Deletes every active run of the experiment. Returns how many were deleted.
pub fn clear_runs(client: &mut dyn Client, experiment: &str) -> Result<usize> {
    let experiment = resolve_source(client, experiment)?;
    let runs = list_runs(client, &experiment.experiment_id)?;
    for run in &runs {
        client.delete_run(&run.info.run_id).map_err(not_found_or_service)?;
        tracing::debug!(run_id = %run.info.run_id, "deleted run");
    }
    tracing::info!(experiment = %experiment.name, runs = runs.len(), "cleared experiment");
    Ok(runs.len())
}

/// Soft deletes the experiment. It can be brought back with [`restore_experiments`].
pub fn delete_experiment(client: &mut dyn Client, experiment: &str) -> Result<ExperimentId> {
    let experiment = resolve_source(client, experiment)?;
    client
        .delete_experiment(&experiment.experiment_id)
        .map_err(not_found_or_service)?;
    tracing::info!(experiment = %experiment.name, id = %experiment.experiment_id, "deleted experiment");
    Ok(experiment.experiment_id)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored(ExperimentId),
    /// The experiment exists and is not deleted.
    AlreadyActive,
    NotFound,
}

/// Restores soft deleted experiments by name.
///
/// Names that are not deleted, or do not exist at all, are reported per name.
pub fn restore_experiments(client: &mut dyn Client, names: &[String]) -> Result<Vec<(String, RestoreOutcome)>> {
    let deleted = list_experiments(client, ViewType::Deleted)?;
    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        let outcome = match deleted.iter().find(|experiment| &experiment.name == name) {
            Some(experiment) => restore(client, experiment)?,
            None => match client.get_experiment_by_name(name) {
                Ok(_) => RestoreOutcome::AlreadyActive,
                Err(GetError::DoesNotExist(_)) => RestoreOutcome::NotFound,
                Err(GetError::Storage(error)) => return Err(Error::service(error)),
            },
        };
        match &outcome {
            RestoreOutcome::Restored(id) => tracing::info!(experiment = %name, %id, "restored experiment"),
            RestoreOutcome::AlreadyActive => tracing::warn!(experiment = %name, "experiment is not deleted"),
            RestoreOutcome::NotFound => tracing::warn!(experiment = %name, "experiment does not exist"),
        }
        outcomes.push((name.clone(), outcome));
    }
    Ok(outcomes)
}

fn restore(client: &mut dyn Client, experiment: &Experiment) -> Result<RestoreOutcome> {
    match client.restore_experiment(&experiment.experiment_id) {
        Ok(()) => Ok(RestoreOutcome::Restored(experiment.experiment_id.clone())),
        Err(GetError::DoesNotExist(_)) => Ok(RestoreOutcome::NotFound),
        Err(GetError::Storage(error)) => Err(Error::service(error)),
    }
}

fn not_found_or_service(error: GetError) -> Error {
    match error {
        GetError::DoesNotExist(what) => Error::NotFound(what),
        GetError::Storage(error) => Error::service(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryServer;

    #[test]
    fn clear_runs_deletes_every_run() {
        let mut server = MemoryServer::new();
        let experiment = server.create_experiment("Exp").unwrap();
        for i in 0..3 {
            server.create_run(&experiment, i, &[]).unwrap();
        }
        assert_eq!(clear_runs(&mut server, "Exp").unwrap(), 3);
        assert_eq!(server.run_count(&experiment), 0);
        assert!(matches!(clear_runs(&mut server, "Other"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_then_restore() {
        let mut server = MemoryServer::new();
        let id = server.create_experiment("Exp").unwrap();
        server.create_experiment("Live").unwrap();
        assert_eq!(delete_experiment(&mut server, "Exp").unwrap(), id);
        assert!(server.get_experiment(&id).unwrap().is_deleted());

        let names = vec!["Exp".to_string(), "Live".to_string(), "Ghost".to_string()];
        let outcomes = restore_experiments(&mut server, &names).unwrap();
        assert_eq!(
            outcomes,
            vec![
                ("Exp".to_string(), RestoreOutcome::Restored(id.clone())),
                ("Live".to_string(), RestoreOutcome::AlreadyActive),
                ("Ghost".to_string(), RestoreOutcome::NotFound),
            ]
        );
        assert!(!server.get_experiment(&id).unwrap().is_deleted());
    }
}
