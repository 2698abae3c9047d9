//! `text` payload: a string placed in the world.

use neko_shared::Transform;

use crate::wrapped::{Payload, WrappedKind};

/// Payload behind `text`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Text {
    /// Displayed string
    pub content: String,
    /// Placement
    pub transform: Transform,
}

impl Text {
    /// Text at the origin.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            transform: Transform::IDENTITY,
        }
    }
}

impl From<String> for Text {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

impl Payload for Text {
    const KIND: WrappedKind = WrappedKind::Text;

    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.content.capacity()
    }

    fn release(&mut self) {
        self.content = String::new();
    }

    fn describe(&self) -> String {
        format!("text({:?})", self.content)
    }
}
