//! Row types flowing through the loader.

/// Number of data fields a record carries, and the number of values the
/// sink binds besides the worker id.
pub const RECORD_ARITY: usize = 5;

/// One parsed input row. Fields stay textual; conversion to column types is
/// left to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub rated: String,
    pub created_at: String,
    pub last_move_at: String,
    pub turns: String,
}

impl Record {
    /// Build a record from the leading `RECORD_ARITY` fields of a row.
    ///
    /// Returns `None` when the row is too short.
    pub fn from_fields<'a, I>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = fields.into_iter();
        Some(Self {
            id: fields.next()?.to_string(),
            rated: fields.next()?.to_string(),
            created_at: fields.next()?.to_string(),
            last_move_at: fields.next()?.to_string(),
            turns: fields.next()?.to_string(),
        })
    }

    /// Fields in write order.
    pub fn fields(&self) -> [&str; RECORD_ARITY] {
        [
            &self.id,
            &self.rated,
            &self.created_at,
            &self.last_move_at,
            &self.turns,
        ]
    }
}

/// A record stamped with the id of the worker that dequeued it. Lives for one
/// worker iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub record: Record,
    pub worker_id: usize,
}

impl WorkItem {
    pub fn new(record: Record, worker_id: usize) -> Self {
        Self { record, worker_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fields_takes_leading_values() {
        let record = Record::from_fields(["TZJHLljE", "FALSE", "1.50421E+12", "1.50421E+12", "13"])
            .expect("five fields");
        assert_eq!(record.id, "TZJHLljE");
        assert_eq!(record.turns, "13");
        assert_eq!(
            record.fields(),
            ["TZJHLljE", "FALSE", "1.50421E+12", "1.50421E+12", "13"]
        );
    }

    #[test]
    fn test_from_fields_short_row() {
        assert_eq!(Record::from_fields(["a", "b", "c"]), None);
    }
}
