//! Files this node serves, looked up by content id

use constellation_core::InboundDescriptor;

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    files: Vec<InboundDescriptor>,
}

impl Catalog {
    pub fn new(files: Vec<InboundDescriptor>) -> Self {
        Self { files }
    }

    /// First file whose content id matches exactly
    pub fn lookup(&self, content_id: &str) -> Option<&InboundDescriptor> {
        self.files.iter().find(|file| file.content_id == content_id)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboundDescriptor> {
        self.files.iter()
    }
}
