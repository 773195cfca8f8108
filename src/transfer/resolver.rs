//! Finds the experiment an export reads from or an import writes into.

use crate::{
    api::{
        client::{list_experiments, ViewType},
        error::{CreateError, GetError},
        experiment::Experiment,
    },
    transfer::error::{Error, Result},
    Client, ExperimentId,
};

/// What an import does when the destination experiment does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingExperiment {
    Create,
    Fail,
}

/// `Ok(None)` when nothing with that name exists.
fn find_by_name(client: &mut dyn Client, name: &str) -> Result<Option<Experiment>> {
    match client.get_experiment_by_name(name) {
        Ok(experiment) => Ok(Some(experiment)),
        Err(GetError::DoesNotExist(_)) => Ok(None),
        Err(GetError::Storage(error)) => Err(Error::service(error)),
    }
}

fn active(experiment: Experiment) -> Result<Experiment> {
    if experiment.is_deleted() {
        Err(Error::NameCollision(experiment.name))
    } else {
        Ok(experiment)
    }
}

/// Looks up the experiment to export. It has to exist and be active.
///
/// `name` is tried as a name first and as an experiment id second.
pub fn resolve_source(client: &mut dyn Client, name: &str) -> Result<Experiment> {
    if let Some(experiment) = find_by_name(client, name)? {
        return active(experiment);
    }
    match client.get_experiment(&ExperimentId::from(name)) {
        Ok(experiment) => {
            tracing::info!(id = name, name = %experiment.name, "found experiment by id");
            return active(experiment);
        }
        Err(GetError::Storage(error)) => {
            let error = Error::service(error);
            if let Error::TransientService(_) = error {
                return Err(error);
            }
            // ids are numeric on most servers, a name is usually rejected as invalid
            tracing::debug!(%error, "lookup by id failed");
        }
        Err(GetError::DoesNotExist(_)) => {}
    }
    match list_experiments(client, ViewType::Active) {
        Ok(available) if !available.is_empty() => {
            tracing::info!("available experiments:");
            for experiment in &available {
                tracing::info!(name = %experiment.name, id = %experiment.experiment_id, "  -");
            }
        }
        Ok(_) => tracing::info!("the tracking server has no active experiments"),
        Err(error) => tracing::debug!(error = %error, "could not list experiments"),
    }
    Err(Error::NotFound(name.to_string()))
}

/// Looks up or creates the experiment an import writes into.
pub fn resolve_destination(client: &mut dyn Client, name: &str, missing: MissingExperiment) -> Result<Experiment> {
    if let Some(experiment) = find_by_name(client, name)? {
        let experiment = active(experiment)?;
        tracing::info!(name, id = %experiment.experiment_id, "using existing experiment");
        return Ok(experiment);
    }
    if missing == MissingExperiment::Fail {
        return Err(Error::NotFound(name.to_string()));
    }
    let id = match client.create_experiment(name) {
        Ok(id) => id,
        Err(CreateError::AlreadyExists(name)) => return Err(Error::AlreadyExists(name)),
        Err(CreateError::Storage(error)) => return Err(Error::service(error)),
    };
    tracing::info!(name, id = %id, "created experiment");
    match client.get_experiment(&id) {
        Ok(experiment) => Ok(experiment),
        Err(GetError::DoesNotExist(id)) => Err(Error::NotFound(id)),
        Err(GetError::Storage(error)) => Err(Error::service(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryServer;

    #[test]
    fn source_must_exist() {
        let mut server = MemoryServer::new();
        assert!(matches!(resolve_source(&mut server, "Exp"), Err(Error::NotFound(name)) if name == "Exp"));
        server.create_experiment("Exp").unwrap();
        assert_eq!(resolve_source(&mut server, "Exp").unwrap().name, "Exp");
    }

    #[test]
    fn source_falls_back_to_id() {
        let mut server = MemoryServer::new();
        let id = server.create_experiment("Exp").unwrap();
        let experiment = resolve_source(&mut server, id.as_ref()).unwrap();
        assert_eq!(experiment.name, "Exp");
    }

    #[test]
    fn deleted_experiment_is_a_collision_not_a_miss() {
        let mut server = MemoryServer::new();
        let id = server.create_experiment("Exp").unwrap();
        server.delete_experiment(&id).unwrap();
        assert!(matches!(resolve_source(&mut server, "Exp"), Err(Error::NameCollision(_))));
        assert!(matches!(
            resolve_destination(&mut server, "Exp", MissingExperiment::Create),
            Err(Error::NameCollision(_))
        ));
    }

    #[test]
    fn strict_destination_fails_when_missing() {
        let mut server = MemoryServer::new();
        assert!(matches!(
            resolve_destination(&mut server, "New", MissingExperiment::Fail),
            Err(Error::NotFound(_))
        ));
        assert!(server.get_experiment_by_name("New").is_err());
    }

    #[test]
    fn destination_is_created_on_demand() {
        let mut server = MemoryServer::new();
        let created = resolve_destination(&mut server, "New", MissingExperiment::Create).unwrap();
        assert_eq!(created.name, "New");
        let again = resolve_destination(&mut server, "New", MissingExperiment::Fail).unwrap();
        assert_eq!(again.experiment_id, created.experiment_id);
    }
}
