use educe::Educe;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{MAX_DEPTH, MAX_MESSAGE_SIZE};

/// Limits applied while unflattening untrusted data.
///
/// # Defaults
///
/// - max_depth: [`MAX_DEPTH`]
/// - max_size: [`MAX_MESSAGE_SIZE`] (no limit)
///
/// Missing fields fall back to their defaults when deserialized, so a host can keep these in its
/// own configuration file and only spell out the limits it wants to change.
#[derive(Educe, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields, default)]
pub struct UnflattenOptions {
    /// How many levels of nested messages are accepted below the top-level message.
    #[educe(Default(expression = MAX_DEPTH))]
    pub max_depth: usize,
    /// Largest flattened message accepted, in bytes.
    #[educe(Default(expression = MAX_MESSAGE_SIZE))]
    pub max_size: usize,
}

impl UnflattenOptions {
    /// No limits, for re-reading bytes that were already checked.
    pub(crate) fn unbounded() -> Self {
        Self {
            max_depth: usize::MAX,
            max_size: usize::MAX,
        }
    }

    pub(crate) fn check_size(&self, actual: usize) -> Result<()> {
        if actual > self.max_size {
            return Err(Error::MessageTooLarge {
                max: self.max_size,
                actual,
            });
        }
        Ok(())
    }

    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::DepthLimitExceeded {
                max: self.max_depth,
            });
        }
        Ok(())
    }
}
