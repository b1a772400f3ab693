//! Organisational placement of people, read by the authorizer.
//!
//! The engine never owns the organisation: it reads it through [`Directory`].
//! [`InMemoryDirectory`] backs tooling and tests.
use std::collections::BTreeMap;
use std::fmt;

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirectionId(pub u32);

/// Grade of a person in the organisational tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Agent,
    HeadOfService,
    DeputyDirector,
    FinanceDirector,
    GeneralDirector,
}

/// Offices held by exactly one person for the whole organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Office {
    HumanResources,
    FinanceDirector,
    GeneralDirector,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Person {
    pub id: UserId,
    pub display_name: String,
    pub position: Position,
    pub service: Option<ServiceId>,
    pub direction: Option<DirectionId>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub direction: Option<DirectionId>,
    pub head: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Direction {
    pub id: DirectionId,
    pub code: String,
    pub director: Option<UserId>,
    pub human_resources: bool,
    pub active: bool,
}

/// Read access to the organisational tree.
pub trait Directory: Send + Sync {
    fn person(&self, id: &UserId) -> anyhow::Result<Option<Person>>;
    fn service(&self, id: ServiceId) -> anyhow::Result<Option<Service>>;
    fn direction(&self, id: DirectionId) -> anyhow::Result<Option<Direction>>;
    fn office_holder(&self, office: Office) -> anyhow::Result<Option<Person>>;
}

impl Person {
    pub fn new(display_name: impl Into<String>, position: Position) -> Self {
        Self {
            id: UserId::new(),
            display_name: display_name.into(),
            position,
            service: None,
            direction: None,
            active: true,
        }
    }
    pub fn in_service(mut self, service: ServiceId) -> Self {
        self.service = Some(service);
        self
    }
    pub fn in_direction(mut self, direction: DirectionId) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

impl Service {
    pub fn new(id: ServiceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            direction: None,
            head: None,
        }
    }
    pub fn in_direction(mut self, direction: DirectionId) -> Self {
        self.direction = Some(direction);
        self
    }
    pub fn headed_by(mut self, head: UserId) -> Self {
        self.head = Some(head);
        self
    }
}

impl Direction {
    pub fn new(id: DirectionId, code: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            director: None,
            human_resources: false,
            active: true,
        }
    }
    pub fn directed_by(mut self, director: UserId) -> Self {
        self.director = Some(director);
        self
    }
    pub fn human_resources(mut self) -> Self {
        self.human_resources = true;
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDirectory {
    people: BTreeMap<UserId, Person>,
    services: BTreeMap<ServiceId, Service>,
    directions: BTreeMap<DirectionId, Direction>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert_person(&mut self, person: Person) -> UserId {
        let id = person.id;
        self.people.insert(id, person);
        id
    }
    pub fn insert_service(&mut self, service: Service) {
        self.services.insert(service.id, service);
    }
    pub fn insert_direction(&mut self, direction: Direction) {
        self.directions.insert(direction.id, direction);
    }

    fn active_with_position(&self, position: Position) -> Option<Person> {
        self.people
            .values()
            .find(|p| p.active && p.position == position)
            .cloned()
    }
}

impl Directory for InMemoryDirectory {
    fn person(&self, id: &UserId) -> anyhow::Result<Option<Person>> {
        Ok(self.people.get(id).cloned())
    }

    fn service(&self, id: ServiceId) -> anyhow::Result<Option<Service>> {
        Ok(self.services.get(&id).cloned())
    }

    fn direction(&self, id: DirectionId) -> anyhow::Result<Option<Direction>> {
        Ok(self.directions.get(&id).cloned())
    }

    fn office_holder(&self, office: Office) -> anyhow::Result<Option<Person>> {
        let holder = match office {
            // the HR office is whoever directs the active HR direction
            Office::HumanResources => self
                .directions
                .values()
                .find(|d| d.active && d.human_resources)
                .and_then(|d| d.director.as_ref())
                .and_then(|id| self.people.get(id))
                .cloned(),
            Office::FinanceDirector => self.active_with_position(Position::FinanceDirector),
            Office::GeneralDirector => self.active_with_position(Position::GeneralDirector),
        };
        Ok(holder)
    }
}

impl<D: Directory + ?Sized> Directory for std::sync::Arc<D> {
    fn person(&self, id: &UserId) -> anyhow::Result<Option<Person>> {
        (**self).person(id)
    }
    fn service(&self, id: ServiceId) -> anyhow::Result<Option<Service>> {
        (**self).service(id)
    }
    fn direction(&self, id: DirectionId) -> anyhow::Result<Option<Direction>> {
        (**self).direction(id)
    }
    fn office_holder(&self, office: Office) -> anyhow::Result<Option<Person>> {
        (**self).office_holder(office)
    }
}
