//! Property-based tests for the request workflow.
//!
//! Each case opens its own sled database, so case counts are kept low. The
//! properties cover:
//!
//! 1. Catalogue isolation: lookups only return edges of the asked type and
//!    state, and only states on that type's circuit have exits
//! 2. Idempotent seeding
//! 3. Random walks: history grows by one per committed step and replays to the
//!    current state
//! 4. Any requester's request reaches a terminal state through the people the
//!    hierarchy names, without the bypass
//! 5. Refused transitions leave the request and its history untouched

mod common;

use std::time::Duration;

use proptest::prelude::*;
use request_workflow::WorkflowError;
use request_workflow::catalogue::{Circuit, StepCatalogue};
use request_workflow::service::TransitionRequest;
use request_workflow::types::{RequestType, Role, WorkflowState};

fn request_type_strategy() -> impl Strategy<Value = RequestType> {
    prop::sample::select(RequestType::ALL.to_vec())
}

fn state_strategy() -> impl Strategy<Value = WorkflowState> {
    prop::sample::select(WorkflowState::ALL.to_vec())
}

fn circuit_strategy() -> impl Strategy<Value = Circuit> {
    prop_oneof![Just(Circuit::Standard), Just(Circuit::Extended)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn lookup_never_leaks_other_edges(
        circuit in circuit_strategy(),
        request_type in request_type_strategy(),
        from in state_strategy(),
    ) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("lookup.db")).unwrap();
        let catalogue = StepCatalogue::open(&db, Duration::from_secs(60)).unwrap();
        catalogue.seed_circuit(circuit).unwrap();

        let edges = catalogue.lookup_edge(request_type, from).unwrap();
        for edge in &edges {
            prop_assert_eq!(edge.request_type, request_type);
            prop_assert_eq!(edge.from, from);
        }
        prop_assert!(edges.windows(2).all(|pair| pair[0].order <= pair[1].order));
        let on_circuit = circuit
            .forward_steps(request_type)
            .iter()
            .any(|step| step.from == from);
        prop_assert_eq!(edges.is_empty(), !on_circuit);
    }

    #[test]
    fn seeding_twice_changes_nothing(circuit in circuit_strategy(), rounds in 2usize..4) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path().join("seed.db")).unwrap();
        let catalogue = StepCatalogue::open(&db, Duration::from_secs(60)).unwrap();

        let first = catalogue.seed_circuit(circuit).unwrap();
        for _ in 1..rounds {
            prop_assert_eq!(catalogue.seed_circuit(circuit).unwrap(), 0);
        }
        prop_assert_eq!(catalogue.len(), first);
    }

    #[test]
    fn random_walk_keeps_history_consistent(
        circuit in circuit_strategy(),
        request_type in request_type_strategy(),
        choices in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
    ) {
        let org = common::org();
        let admin = org.gaston;
        let (_dir, service) = common::service(circuit, org.directory).unwrap();
        let mut request = service.create_request(request_type, org.alice).unwrap();

        for choice in choices {
            let edges = service.next_states(&request.id).unwrap();
            if edges.is_empty() {
                prop_assert!(request.is_terminal());
                break;
            }
            let edge = edges[choice.index(edges.len())];
            let before = service.history(&request.id).unwrap().len();

            request = service
                .transition(
                    TransitionRequest::new(request.id, edge.to, admin, Role::Administrator)
                        .skip_hierarchy_check(),
                )
                .unwrap();

            let history = service.history(&request.id).unwrap();
            prop_assert_eq!(history.len(), before + 1);
            prop_assert_eq!(history.last().unwrap().to_state, request.current_state);
            prop_assert_eq!(request.version as usize, history.len());
        }

        prop_assert_eq!(service.replay(&request.id).unwrap(), request.current_state);
        prop_assert!(service.verify(&request.id).is_ok());
    }

    #[test]
    fn every_requester_can_finish_without_bypass(
        circuit in circuit_strategy(),
        request_type in request_type_strategy(),
        requester in any::<prop::sample::Index>(),
        choices in prop::collection::vec(any::<prop::sample::Index>(), 10),
    ) {
        let org = common::org();
        let members = [
            org.alice, org.bruno, org.hugo, org.sofia, org.dora, org.rita, org.fanny, org.gaston,
        ];
        let requester = members[requester.index(members.len())];
        let (_dir, service) = common::service(circuit, org.directory).unwrap();
        let mut request = service.create_request(request_type, requester).unwrap();

        for choice in choices {
            let edges = service.next_states(&request.id).unwrap();
            if edges.is_empty() {
                break;
            }
            let edge = edges[choice.index(edges.len())];
            let (actor, role) = match edge.required_role {
                Some(role) => {
                    let validator = service.expected_validator(&request.id, edge.to).unwrap();
                    prop_assert!(validator.is_some(), "nobody can take {:?}", edge);
                    (validator.unwrap().id, role)
                }
                None => (requester, Role::Requester),
            };
            prop_assert!(!service.pending_for(&actor).unwrap().is_empty() || edge.is_rejection());

            request = service
                .transition(TransitionRequest::new(request.id, edge.to, actor, role))
                .unwrap();
        }

        prop_assert!(request.is_terminal());
        prop_assert!(service.verify(&request.id).is_ok());
    }

    #[test]
    fn refused_transitions_change_nothing(
        request_type in request_type_strategy(),
        target in state_strategy(),
    ) {
        let org = common::org();
        let (alice, bruno) = (org.alice, org.bruno);
        let (_dir, service) = common::service(Circuit::Standard, org.directory).unwrap();
        let request = service.create_request(request_type, alice).unwrap();
        let request = service
            .transition(TransitionRequest::new(request.id, WorkflowState::Submitted, alice, Role::Requester))
            .unwrap();

        // a colleague is never the validator of the request
        let outcome = service.transition(TransitionRequest::new(request.id, target, bruno, Role::N1));
        match outcome {
            Err(WorkflowError::InvalidTransition { .. }) => {
                prop_assert!(
                    target != WorkflowState::ValidationLevel1 && target != WorkflowState::Rejected
                );
            }
            Err(WorkflowError::Unauthorized { .. }) => {
                prop_assert!(
                    target == WorkflowState::ValidationLevel1 || target == WorkflowState::Rejected
                );
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }

        prop_assert_eq!(service.history(&request.id).unwrap().len(), 1);
        prop_assert_eq!(service.request(&request.id).unwrap(), request);
    }
}
