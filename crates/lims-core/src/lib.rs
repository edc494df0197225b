//! LIMS Core - lab case tracking
//!
//! Physical lab cases move through free-form phases. Each case is a folder
//! holding a JSON state document; workers identify by scanning their own QR
//! and then record progress by scanning the case's QR.
//!
//! - [`CaseStore`] maps display names to folders and owns the state documents
//! - [`EventRecorder`] appends events and moves the current phase
//! - [`EmployeeDirectory`] and [`Identifier`] attribute scans to workers
//! - [`Mirror`] pushes case folders to an optional remote
//! - [`CaseService`] ties them into the scan workflow
//!
//! # Example
//!
//! ```rust,ignore
//! use lims_core::prelude::*;
//!
//! # async fn example(service: CaseService) -> Result<(), LimsError> {
//! service.create_case("Juan Pérez", "crown, shade A2", vec![]).await?;
//!
//! let session = service.identifier().identify("jonathan", "2989")?;
//! let outcome = service
//!     .track("Juan Pérez", Some(&session.token()), Some("EN PROCESO"), None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod directory;
pub mod error;
pub mod mirror;
pub mod naming;
pub mod qr;
pub mod recorder;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use config::{DropboxCredentials, DropboxSettings, LimsConfig};
pub use directory::{Employee, EmployeeDirectory};
pub use error::{ErrorKind, LimsError, LimsResult};
pub use mirror::{Mirror, RemoteStore, SyncReport};
pub use naming::safe_name;
pub use qr::{QrArtifacts, QrRenderer};
pub use recorder::EventRecorder;
pub use service::{Attachment, CaseService, TrackOutcome, QR_URL_PREFIX};
pub use session::{Identifier, Session, SESSION_COOKIE};
pub use store::{CaseStore, DeleteReport};
pub use types::{CaseRef, CaseState, CaseSummary, Event, IN_PROCESS, RECEIVED};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with LIMS Core
    pub use crate::{
        Attachment, CaseRef, CaseService, CaseState, CaseStore, Employee, EmployeeDirectory,
        Event, EventRecorder, Identifier, LimsConfig, LimsError, LimsResult, Session,
        TrackOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
