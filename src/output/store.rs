use super::record::ExtractedRecord;

/// Append-only, insertion-ordered record collection
///
/// Pushes beyond `max_records` are dropped and counted. A `None` cap holds
/// every record.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<ExtractedRecord>,
    max_records: Option<u64>,
    dropped: u64,
}

impl ResultStore {
    pub fn new(max_records: Option<u64>) -> Self {
        Self {
            records: Vec::new(),
            max_records,
            dropped: 0,
        }
    }

    /// Appends a record
    ///
    /// # Returns
    ///
    /// * `true` - The record was stored
    /// * `false` - The store is full; the record was dropped
    pub fn push(&mut self, record: ExtractedRecord) -> bool {
        if self.is_full() {
            self.dropped += 1;
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn is_full(&self) -> bool {
        self.max_records
            .map_or(false, |max| self.records.len() as u64 >= max)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ExtractedRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn record(n: u32) -> ExtractedRecord {
        ExtractedRecord::new(&Url::parse(&format!("https://a.test/{}", n)).unwrap())
    }

    #[test]
    fn test_unbounded_store_keeps_everything_in_order() {
        let mut store = ResultStore::new(None);
        for n in 0..5 {
            assert!(store.push(record(n)));
        }
        let urls: Vec<_> = store.records().iter().filter_map(|r| r.url()).collect();
        assert_eq!(urls[0], "https://a.test/0");
        assert_eq!(urls[4], "https://a.test/4");
        assert_eq!(store.dropped(), 0);
    }

    #[test]
    fn test_cap_drops_and_counts() {
        let mut store = ResultStore::new(Some(2));
        assert!(store.push(record(0)));
        assert!(store.push(record(1)));
        assert!(store.is_full());
        assert!(!store.push(record(2)));
        assert!(!store.push(record(3)));

        assert_eq!(store.len(), 2);
        assert_eq!(store.dropped(), 2);
    }
}
