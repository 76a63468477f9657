pub mod archive;
pub mod orchestrator;

pub use archive::{ArchiveError, AuditArchive};
pub use orchestrator::{OrchestratorConfig, Registry, Tracked, TriageOrchestrator};
