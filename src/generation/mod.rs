//! Generation - grounded answers from a local language model
//!
//! The pipeline hands a `Generator` the question and the final ranked
//! passages; the generator owns prompt construction and the model call.

mod llama;
mod prompt;

pub use llama::{parse_sse_line, LlamaServerGenerator, SseEvent};
pub use prompt::{build_messages, format_passages, ChatMessage, Role};

use crate::error::Result;
use crate::passage::RankedResultSet;

/// Answer generator interface
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the complete answer
    fn generate(&self, query: &str, passages: &RankedResultSet) -> Result<String>;

    /// Produce the answer incrementally
    ///
    /// Every fragment is passed to `sink` as it arrives; the returned string
    /// is the concatenation of all fragments. The default forwards the
    /// blocking answer as a single fragment.
    fn generate_stream(
        &self,
        query: &str,
        passages: &RankedResultSet,
        sink: &mut dyn FnMut(&str),
    ) -> Result<String> {
        let text = self.generate(query, passages)?;
        sink(&text);
        Ok(text)
    }
}
