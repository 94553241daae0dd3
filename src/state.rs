use crate::store::{MarkStore, StudentStore};
use std::sync::Arc;

/// What every handler gets through `State`. Both stores are usually the same
/// backend behind two interfaces.
#[derive(Clone)]
pub struct TallyState {
    students: Arc<dyn StudentStore>,
    marks: Arc<dyn MarkStore>,
}

impl TallyState {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: StudentStore + MarkStore + 'static,
    {
        Self {
            students: store.clone(),
            marks: store,
        }
    }

    pub fn students(&self) -> &dyn StudentStore {
        self.students.as_ref()
    }

    pub fn marks(&self) -> &dyn MarkStore {
        self.marks.as_ref()
    }
}
