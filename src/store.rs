//! Ordered, in-memory collection of diagnosis records.
//!
//! Insertion order is meaningful (newest last). Removing a record never
//! renumbers or reorders the survivors, and ids are never handed out twice:
//! the id counter only moves forward.

use crate::record::{DiagnosisRecord, NewRecord, RecordId};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DiagnosisStore {
    records: Vec<DiagnosisRecord>,
    next_id: u64,
}

impl Default for DiagnosisStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosisStore {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
        }
    }

    /// Assign a fresh id and append at the end.
    pub fn append(&mut self, record: NewRecord) -> RecordId {
        self.append_record(record).id
    }

    /// Like [`append`](Self::append), returning the stored record.
    pub fn append_record(&mut self, record: NewRecord) -> &DiagnosisRecord {
        let id = RecordId::new(self.next_id);
        self.next_id += 1;
        self.records.push(record.into_record(id));
        debug!("Store: appended record {} ({} total)", id, self.records.len());
        &self.records[self.records.len() - 1]
    }

    /// Remove the record with `id`. `None` if there is no such record.
    pub fn remove(&mut self, id: RecordId) -> Option<DiagnosisRecord> {
        let pos = self.position(id)?;
        Some(self.records.remove(pos))
    }

    /// Remove the record at `index` (0-based, current order).
    pub fn remove_at(&mut self, index: usize) -> Option<DiagnosisRecord> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    pub fn get(&self, id: RecordId) -> Option<&DiagnosisRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn position(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.id == id)
    }

    pub fn records(&self) -> &[DiagnosisRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiagnosisRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a DiagnosisStore {
    type Item = &'a DiagnosisRecord;
    type IntoIter = std::slice::Iter<'a, DiagnosisRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
