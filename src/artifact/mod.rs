//! Value types identifying external artifacts.
//!
//! - [`ArtifactKey`] - validated `group:name:version[:classifier]` coordinate
//! - [`ArtifactModule`] - versionless `group:name`, completed by configuration
//! - [`ResolvedArtifact`] - a key bound to the concrete file the host resolver produced
//! - [`ContentHash`] / [`HashMode`] - content identity used for cache deduplication
//! - [`Origin`] - whether the file came from a repository or from inside the workspace

mod key;
mod resolved;

pub use key::{ArtifactKey, ArtifactModule};
pub use resolved::{ContentHash, HashMode, Origin, ResolvedArtifact};
