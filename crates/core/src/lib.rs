pub mod audit;
pub mod auth;
pub mod config;
pub mod diff;
pub mod domain;
pub mod errors;
pub mod ids;
pub mod store;
pub mod tracker;
pub mod workflow;

pub use audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use auth::{Actor, Authorizer, Operation, Role, RoleAuthorizer};
pub use domain::employee::{Employee, EmployeeStatus};
pub use domain::entity::{Approvable, LifecycleStatus, UniqueKey};
pub use domain::meta::{ActorRef, ApprovalMeta, BusinessId, EntityId, EntityKind, ModifiedData, RequestStatus};
pub use domain::payment::{Payment, PaymentStatus, TransactionType};
pub use domain::subscriber::{Subscriber, SubscriberStatus};
pub use domain::ticket::{Ticket, TicketStatus};
pub use domain::value::{ChangeSet, FieldPath, FieldValue};
pub use errors::{ApplicationError, DomainError, ErrorClass, InterfaceError};
pub use ids::IdGenerator;
pub use store::{EntityFilter, EntityStore, InMemoryEntityStore, StoreError, WriteGuard};
pub use workflow::{
    ApprovalService, BulkDecisionItem, BulkOutcome, Decision, DecisionPayload, Proposal,
    ProposalOutcome,
};
