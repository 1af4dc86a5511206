use std::collections::HashMap;
use std::sync::RwLock;

use crate::core::{DocumentId, DocumentSnapshot, FiscalDocument, StoreError};

/// Persistence for fiscal documents.
///
/// The pipeline saves after every committed transition and every recorded
/// submission attempt, so a loaded document always reflects the last step
/// that actually completed.
pub trait DocumentStore: Send + Sync {
    fn save(&self, document: &FiscalDocument) -> Result<(), StoreError>;
    fn load(&self, id: &DocumentId) -> Result<Option<FiscalDocument>, StoreError>;
}

/// Process-local store, mainly for tests and single-node tools.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, FiscalDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only operator view of a stored document.
    pub fn snapshot(&self, id: &DocumentId) -> Option<DocumentSnapshot> {
        self.documents
            .read()
            .ok()
            .and_then(|docs| docs.get(id).map(FiscalDocument::snapshot))
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn save(&self, document: &FiscalDocument) -> Result<(), StoreError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|_| StoreError("document map lock poisoned".into()))?;
        docs.insert(document.id().clone(), document.clone());
        Ok(())
    }

    fn load(&self, id: &DocumentId) -> Result<Option<FiscalDocument>, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|_| StoreError("document map lock poisoned".into()))?;
        Ok(docs.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DocumentState;

    #[test]
    fn save_overwrites_and_snapshots() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new("INV-001");
        assert!(store.snapshot(&id).is_none());

        let doc = FiscalDocument::new(id.clone());
        store.save(&doc).unwrap();
        store.save(&doc).unwrap();
        assert_eq!(store.len(), 1);

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.state, DocumentState::Draft);
        assert_eq!(store.load(&id).unwrap().unwrap().id(), &id);
    }
}
