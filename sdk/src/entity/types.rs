//! Core types for the entity framework

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// In-flight CRUD status of an entity.
///
/// A single state makes the busy flags mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Idle,
    Fetching,
    Creating,
    Updating,
    Deleting,
}

impl LifecycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, LifecycleState::Idle)
    }

    /// Creating, updating or deleting
    pub fn is_saving(&self) -> bool {
        matches!(
            self,
            LifecycleState::Creating | LifecycleState::Updating | LifecycleState::Deleting
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Fetching => "fetching",
            LifecycleState::Creating => "creating",
            LifecycleState::Updating => "updating",
            LifecycleState::Deleting => "deleting",
        };
        write!(f, "{}", name)
    }
}

/// Comprehensive error type for entity operations
#[derive(Error, Debug)]
pub enum EntityError {
    /// The remote side answered with a non-2xx status
    #[error("Remote operation failed for entity '{entity_type}' ({status}): {message}")]
    RemoteOperationFailed {
        entity_type: String,
        status: u16,
        message: String,
    },

    /// Operation invoked without what it needs, raised before any request
    #[error("Precondition failed for entity '{entity_type}': {reason}")]
    Precondition {
        entity_type: String,
        reason: String,
    },

    /// A lifecycle operation was started while another one is in flight
    #[error("Entity '{entity_type}' is busy ({state})")]
    Busy {
        entity_type: String,
        state: LifecycleState,
    },

    /// Explicit offset access on an index that holds nothing
    #[error("Offset {offset} does not exist")]
    OffsetNotExists {
        offset: usize,
    },

    /// Explicit removal of an entity that is not part of the collection
    #[error("Resource '{entity_type}' does not exist in the collection")]
    ResourceNotExists {
        entity_type: String,
    },

    /// Malformed attribute path
    #[error("Invalid attribute path '{path}': {reason}")]
    InvalidPath {
        path: String,
        reason: String,
    },

    /// Transport level failure (connection, decoding, cancellation)
    #[error("Transport error: {message}")]
    Transport {
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration {
        reason: String,
    },
}

impl EntityError {
    /// Create a RemoteOperationFailed error
    pub fn remote<E: AsRef<str>, M: AsRef<str>>(entity_type: E, status: u16, message: M) -> Self {
        Self::RemoteOperationFailed {
            entity_type: entity_type.as_ref().to_string(),
            status,
            message: message.as_ref().to_string(),
        }
    }

    /// Create a Precondition error
    pub fn precondition<E: AsRef<str>, R: AsRef<str>>(entity_type: E, reason: R) -> Self {
        Self::Precondition {
            entity_type: entity_type.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }

    /// Create a Busy error
    pub fn busy<E: AsRef<str>>(entity_type: E, state: LifecycleState) -> Self {
        Self::Busy {
            entity_type: entity_type.as_ref().to_string(),
            state,
        }
    }

    pub fn offset_not_exists(offset: usize) -> Self {
        Self::OffsetNotExists { offset }
    }

    pub fn resource_not_exists<E: AsRef<str>>(entity_type: E) -> Self {
        Self::ResourceNotExists {
            entity_type: entity_type.as_ref().to_string(),
        }
    }

    /// Create an InvalidPath error
    pub fn invalid_path<P: AsRef<str>, R: AsRef<str>>(path: P, reason: R) -> Self {
        Self::InvalidPath {
            path: path.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }

    /// Create a Configuration error
    pub fn configuration<R: AsRef<str>>(reason: R) -> Self {
        Self::Configuration {
            reason: reason.as_ref().to_string(),
        }
    }

    /// Get the entity type associated with this error (if any)
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            Self::RemoteOperationFailed { entity_type, .. }
            | Self::Precondition { entity_type, .. }
            | Self::Busy { entity_type, .. }
            | Self::ResourceNotExists { entity_type } => Some(entity_type),
            Self::OffsetNotExists { .. }
            | Self::InvalidPath { .. }
            | Self::Transport { .. }
            | Self::Configuration { .. } => None,
        }
    }

    /// HTTP status carried by a remote failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteOperationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RemoteOperationFailed { .. }
            | Self::Busy { .. }
            | Self::Transport { .. }
            | Self::OffsetNotExists { .. }
            | Self::ResourceNotExists { .. } => true,

            Self::Precondition { .. } | Self::InvalidPath { .. } | Self::Configuration { .. } => {
                false
            }
        }
    }
}

/// Result type alias for entity operations
pub type EntityResult<T> = Result<T, EntityError>;

impl From<anyhow::Error> for EntityError {
    fn from(error: anyhow::Error) -> Self {
        EntityError::Transport {
            message: format!("{:#}", error),
        }
    }
}
