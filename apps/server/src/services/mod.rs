//! Business logic layer

pub mod audit;
pub mod resolver;
pub mod search;
pub mod staff;

pub use audit::{AuditSink, PostgresAuditSink, SearchAuditor, SearchEvent, TracingAuditSink};
pub use resolver::IdentityResolver;
pub use search::{Paging, PatientSearchService, SearchScope};
pub use staff::{NewStaff, StaffService};
