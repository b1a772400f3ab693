#![allow(dead_code)]

use std::sync::Arc;

use request_workflow::catalogue::Circuit;
use request_workflow::config::CatalogueConfig;
use request_workflow::directory::{
    Direction, DirectionId, InMemoryDirectory, Person, Position, Service, ServiceId,
};
use request_workflow::ids::UserId;
use request_workflow::service::WorkflowService;
use tempfile::TempDir;

/// A small administration: one IT direction with a development service, an
/// HR direction, a finance director and a general director.
pub struct Org {
    pub directory: InMemoryDirectory,
    /// agent in the development service
    pub alice: UserId,
    /// agent in the same service
    pub bruno: UserId,
    /// head of the development service
    pub hugo: UserId,
    /// head of another service of the same direction
    pub sofia: UserId,
    /// deputy director of IT
    pub dora: UserId,
    /// deputy director of HR, holder of the HR office
    pub rita: UserId,
    pub fanny: UserId,
    pub gaston: UserId,
}

pub fn org() -> Org {
    let mut directory = InMemoryDirectory::new();

    let dora = directory.insert_person(
        Person::new("Dora Diallo", Position::DeputyDirector).in_direction(DirectionId(1)),
    );
    let rita = directory.insert_person(
        Person::new("Rita Traore", Position::DeputyDirector).in_direction(DirectionId(2)),
    );
    let hugo = directory.insert_person(
        Person::new("Hugo Martin", Position::HeadOfService)
            .in_service(ServiceId(10))
            .in_direction(DirectionId(1)),
    );
    let sofia = directory.insert_person(
        Person::new("Sofia Ndiaye", Position::HeadOfService)
            .in_service(ServiceId(11))
            .in_direction(DirectionId(1)),
    );
    let alice = directory.insert_person(
        Person::new("Alice Kone", Position::Agent)
            .in_service(ServiceId(10))
            .in_direction(DirectionId(1)),
    );
    let bruno = directory.insert_person(
        Person::new("Bruno Kouassi", Position::Agent)
            .in_service(ServiceId(10))
            .in_direction(DirectionId(1)),
    );
    let fanny = directory.insert_person(Person::new("Fanny Bamba", Position::FinanceDirector));
    let gaston = directory.insert_person(Person::new("Gaston Yao", Position::GeneralDirector));

    directory.insert_direction(Direction::new(DirectionId(1), "DSI").directed_by(dora));
    directory.insert_direction(
        Direction::new(DirectionId(2), "RH")
            .directed_by(rita)
            .human_resources(),
    );
    directory.insert_service(
        Service::new(ServiceId(10), "Development")
            .in_direction(DirectionId(1))
            .headed_by(hugo),
    );
    directory.insert_service(
        Service::new(ServiceId(11), "Infrastructure")
            .in_direction(DirectionId(1))
            .headed_by(sofia),
    );

    Org {
        directory,
        alice,
        bruno,
        hugo,
        sofia,
        dora,
        rita,
        fanny,
        gaston,
    }
}

pub fn open_db(temp_dir: &TempDir, name: &str) -> anyhow::Result<Arc<sled::Db>> {
    let db = sled::open(temp_dir.path().join(name))?;
    Ok(Arc::new(db))
}

/// A bootstrapped service over a fresh database. The `TempDir` must outlive
/// the service.
pub fn service(
    circuit: Circuit,
    directory: InMemoryDirectory,
) -> anyhow::Result<(TempDir, WorkflowService<InMemoryDirectory>)> {
    let temp_dir = tempfile::tempdir()?;
    let db = open_db(&temp_dir, "workflow.db")?;
    let settings = CatalogueConfig {
        circuit,
        cache_ttl_secs: 300,
        replace_existing: false,
    };
    let service = WorkflowService::new(db, directory, &settings)?;
    service.bootstrap()?;
    Ok((temp_dir, service))
}
