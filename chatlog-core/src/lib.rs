// ABOUTME: Host-independent core for turning overlong chat messages into temporary files
// ABOUTME: Provides the conversion policy, artifact types, and the transient artifact manager

pub mod artifact;
pub mod clock;
pub mod error;
pub mod manager;
pub mod policy;

pub use artifact::{ArtifactHandle, ArtifactState, IncomingMessage};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ArtifactError;
pub use manager::{ArtifactManager, DeletionOutcome, DeletionTask, PurgeReport};
pub use policy::{should_convert, ConversionPolicy, Decision};
