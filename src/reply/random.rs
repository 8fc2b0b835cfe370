//! Random choice among several replies.

use rand::Rng;

use crate::error::ConfigError;
use crate::reply::Reply;

/// Reply delegating to one of its sub-replies, drawn uniformly on every call.
#[derive(Debug, Clone, Default)]
pub struct RandomReply {
    replies: Vec<Reply>,
}

impl RandomReply {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sub-reply.
    pub fn add(mut self, reply: impl Into<Reply>) -> Self {
        self.replies.push(reply.into());
        self
    }

    pub fn replies(&self) -> &[Reply] {
        &self.replies
    }

    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.replies.is_empty() {
            return Err(ConfigError::EmptyRandomReply);
        }
        self.replies.iter().try_for_each(Reply::validate)
    }

    /// Draw one sub-reply.
    ///
    /// # Parameters
    ///
    /// - `rng` - Random source; one index in `[0, len)` is drawn per call
    ///
    /// # Returns
    ///
    /// Returns the chosen sub-reply.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyRandomReply` when there is nothing to choose from.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Reply, ConfigError> {
        if self.replies.is_empty() {
            return Err(ConfigError::EmptyRandomReply);
        }
        let index = rng.gen_range(0..self.replies.len());
        Ok(&self.replies[index])
    }
}

impl FromIterator<Reply> for RandomReply {
    fn from_iter<I: IntoIterator<Item = Reply>>(iter: I) -> Self {
        Self { replies: iter.into_iter().collect() }
    }
}
