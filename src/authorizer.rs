//! Resolves which concrete person must perform a validation.
//!
//! A role on an edge is not a global permission: `N1` means "the requester's
//! direct superior", which depends on the requester's service and grade. The
//! authorizer walks the organisational tree from the request's owner to find
//! the person currently occupying the role, then compares with the actor.
use crate::directory::{Directory, Office, Person, Position};
use crate::error::{Result, WorkflowError};
use crate::ids::UserId;
use crate::request::Request;
use crate::types::Role;

/// Validators of one requester, resolved from their placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    pub requester: Person,
    pub n_plus_1: Option<Person>,
    pub n_plus_2: Option<Person>,
    pub human_resources: Option<Person>,
    pub general_director: Option<Person>,
    pub finance_director: Option<Person>,
}

/// Outcome of resolving an edge's role for a given request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The edge carries no role; any active person may take it.
    Anyone,
    Person(Person),
    /// Nobody occupies the role for this requester.
    Vacant(Role),
}

impl Hierarchy {
    /// Person occupying `role` for this requester. Nobody validates their own
    /// request, so a validator role the requester would hold is vacant.
    pub fn holder(&self, role: Role) -> Option<&Person> {
        let holder = match role {
            Role::Requester => return Some(&self.requester),
            Role::N1 => self.n_plus_1.as_ref(),
            Role::N2 => self.n_plus_2.as_ref(),
            Role::HumanResources => self.human_resources.as_ref(),
            Role::GeneralDirector => self.general_director.as_ref(),
            Role::FinanceDirector => self.finance_director.as_ref(),
            Role::Administrator => None,
        };
        holder.filter(|person| person.id != self.requester.id)
    }

    pub fn is_occupied(&self, role: Option<Role>) -> bool {
        role.is_none_or(|role| self.holder(role).is_some())
    }
}

impl Resolution {
    pub fn person(&self) -> Option<&Person> {
        match self {
            Resolution::Person(person) => Some(person),
            Resolution::Anyone | Resolution::Vacant(_) => None,
        }
    }
}

pub struct HierarchyAuthorizer<D> {
    directory: D,
}

impl<D: Directory> HierarchyAuthorizer<D> {
    pub fn new(directory: D) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn hierarchy(&self, requester: &UserId) -> Result<Hierarchy> {
        let person = self
            .directory
            .person(requester)?
            .ok_or(WorkflowError::UnknownUser(*requester))?;

        let finance_director = self.active_office(Office::FinanceDirector)?;
        let general_director = self.active_office(Office::GeneralDirector)?;

        let (n_plus_1, n_plus_2) = match person.position {
            Position::Agent => (self.head_of_service(&person)?, self.director_of(&person)?),
            Position::HeadOfService => (self.director_of(&person)?, finance_director.clone()),
            Position::DeputyDirector => (finance_director.clone(), None),
            Position::FinanceDirector | Position::GeneralDirector => (None, None),
        };

        // nobody validates their own request as HR
        let human_resources = self
            .active_office(Office::HumanResources)?
            .filter(|hr| hr.id != person.id);

        Ok(Hierarchy {
            requester: person,
            n_plus_1,
            n_plus_2,
            human_resources,
            general_director,
            finance_director,
        })
    }

    /// Who must take an edge carrying `role` on `request`.
    pub fn resolve(&self, request: &Request, role: Option<Role>) -> Result<Resolution> {
        let Some(role) = role else {
            return Ok(Resolution::Anyone);
        };
        let hierarchy = self.hierarchy(&request.requester)?;
        Ok(match hierarchy.holder(role) {
            Some(person) => Resolution::Person(person.clone()),
            None => Resolution::Vacant(role),
        })
    }

    pub fn expected_validator(&self, request: &Request, role: Option<Role>) -> Result<Option<Person>> {
        Ok(self.resolve(request, role)?.person().cloned())
    }

    /// The actor must be an active person of the directory, and the expected
    /// validator when the role resolves to someone. Vacant roles admit nobody.
    pub fn can_validate(&self, actor: &UserId, request: &Request, role: Option<Role>) -> Result<bool> {
        let Some(actor) = self.directory.person(actor)?.filter(|p| p.active) else {
            tracing::debug!(actor = %actor, "actor is not an active member of the directory");
            return Ok(false);
        };

        Ok(match self.resolve(request, role)? {
            Resolution::Anyone => true,
            Resolution::Person(expected) => expected.id == actor.id,
            Resolution::Vacant(role) => {
                tracing::debug!(request_id = %request.id, role = %role, "no validator occupies role");
                false
            }
        })
    }

    /// Whether `actor` occupies `role` for the request's requester.
    pub fn holds_role(&self, actor: &UserId, request: &Request, role: Role) -> Result<bool> {
        let hierarchy = self.hierarchy(&request.requester)?;
        Ok(hierarchy.holder(role).is_some_and(|person| person.id == *actor))
    }

    fn active_office(&self, office: Office) -> Result<Option<Person>> {
        Ok(self.directory.office_holder(office)?.filter(|p| p.active))
    }

    fn active_person(&self, id: Option<UserId>) -> Result<Option<Person>> {
        match id {
            Some(id) => Ok(self.directory.person(&id)?.filter(|p| p.active)),
            None => Ok(None),
        }
    }

    fn head_of_service(&self, person: &Person) -> Result<Option<Person>> {
        let Some(service_id) = person.service else {
            return Ok(None);
        };
        let head = self.directory.service(service_id)?.and_then(|s| s.head);
        self.active_person(head)
    }

    // falls back to the direction of the person's service
    fn director_of(&self, person: &Person) -> Result<Option<Person>> {
        let direction_id = match person.direction {
            Some(id) => Some(id),
            None => match person.service {
                Some(service_id) => self.directory.service(service_id)?.and_then(|s| s.direction),
                None => None,
            },
        };
        let Some(direction_id) = direction_id else {
            return Ok(None);
        };
        let director = self
            .directory
            .direction(direction_id)?
            .filter(|d| d.active)
            .and_then(|d| d.director);
        self.active_person(director)
    }
}
