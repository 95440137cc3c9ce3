//! Row Schema
//!
//! The header and the record layout come from one place so the two cannot
//! drift apart.

use qsweep_core::{ResultRow, RowKey};

/// Header of sweeps that calibrate delays
pub const HEADER_WITH_DELAY: [&str; 9] = [
    "Queue",
    "Producers",
    "Consumers",
    "Size",
    "Items",
    "Runs",
    "Delay",
    "Score",
    "Score Error",
];

/// Header of sweeps without a delay axis
pub const HEADER_WITHOUT_DELAY: [&str; 8] = [
    "Queue",
    "Producers",
    "Consumers",
    "Size",
    "Items",
    "Runs",
    "Score",
    "Score Error",
];

/// Column layout of the CSV sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSchema {
    /// Includes the `Delay` column
    WithDelay,
    /// Omits the `Delay` column
    WithoutDelay,
}

impl RowSchema {
    /// Pick the layout for a sweep over `delays`: the column is dropped only
    /// when every delay is below the calibration threshold and all of them
    /// are the same value. Distinct delays always need the column to keep
    /// their rows apart.
    pub fn for_delays(delays: &[u64], min_delay_ns: u64) -> Self {
        let distinct = delays.windows(2).any(|pair| pair[0] != pair[1]);
        if distinct || delays.iter().any(|&d| d >= min_delay_ns) {
            RowSchema::WithDelay
        } else {
            RowSchema::WithoutDelay
        }
    }

    /// Column names
    pub fn header(&self) -> &'static [&'static str] {
        match self {
            RowSchema::WithDelay => &HEADER_WITH_DELAY,
            RowSchema::WithoutDelay => &HEADER_WITHOUT_DELAY,
        }
    }

    /// Whether rows carry the delay column
    pub fn has_delay(&self) -> bool {
        matches!(self, RowSchema::WithDelay)
    }

    /// Render `row` in column order
    pub fn record(&self, row: &ResultRow) -> Vec<String> {
        let cfg = &row.configuration;
        let mut record = vec![
            cfg.queue.clone(),
            cfg.producers().to_string(),
            cfg.consumers().to_string(),
            cfg.capacity.to_string(),
            cfg.ops.to_string(),
            row.runs.to_string(),
        ];
        if self.has_delay() {
            record.push(cfg.delay_ns.to_string());
        }
        record.push(row.score.to_string());
        record.push(row.score_error.to_string());
        record
    }

    /// Key of a row as this schema stores it
    pub fn key_of(&self, key: RowKey) -> RowKey {
        if self.has_delay() {
            key
        } else {
            key.without_delay()
        }
    }

    /// Recover the key columns of a stored record
    pub fn parse_key(&self, fields: &[&str]) -> Result<RowKey, String> {
        let header = self.header();
        if fields.len() != header.len() {
            return Err(format!(
                "expected {} fields, found {}",
                header.len(),
                fields.len()
            ));
        }

        fn number<T: std::str::FromStr>(column: &str, value: &str) -> Result<T, String> {
            value
                .trim()
                .parse()
                .map_err(|_| format!("column {}: invalid value {:?}", column, value))
        }

        let delay_ns = if self.has_delay() {
            Some(number(header[6], fields[6])?)
        } else {
            None
        };

        Ok(RowKey {
            queue: fields[0].to_string(),
            producers: number(header[1], fields[1])?,
            consumers: number(header[2], fields[2])?,
            size: number(header[3], fields[3])?,
            items: number(header[4], fields[4])?,
            runs: number(header[5], fields[5])?,
            delay_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qsweep_core::{Configuration, ThreadPair};

    fn row() -> ResultRow {
        ResultRow {
            configuration: Configuration {
                queue: "LinkedMuxQueue".to_string(),
                threads: ThreadPair::new(8, 8),
                capacity: 2048,
                ops: 1_000_000,
                delay_ns: 17_000,
            },
            score: 1250.5,
            score_error: 3.25,
            runs: 10,
        }
    }

    #[test]
    fn test_record_matches_header_width() {
        for schema in [RowSchema::WithDelay, RowSchema::WithoutDelay] {
            assert_eq!(schema.record(&row()).len(), schema.header().len());
        }
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(
            RowSchema::WithDelay.record(&row()),
            vec![
                "LinkedMuxQueue",
                "8",
                "8",
                "2048",
                "1000000",
                "10",
                "17000",
                "1250.5",
                "3.25"
            ]
        );
        assert_eq!(
            RowSchema::WithoutDelay.record(&row()),
            vec![
                "LinkedMuxQueue",
                "8",
                "8",
                "2048",
                "1000000",
                "10",
                "1250.5",
                "3.25"
            ]
        );
    }

    #[test]
    fn test_parse_key_recovers_identity() {
        let schema = RowSchema::WithDelay;
        let record = schema.record(&row());
        let fields: Vec<&str> = record.iter().map(String::as_str).collect();

        assert_eq!(schema.parse_key(&fields).unwrap(), row().key());
    }

    #[test]
    fn test_parse_key_rejects_bad_rows() {
        let schema = RowSchema::WithoutDelay;
        assert!(schema.parse_key(&["q", "1"]).is_err());
        let err = schema
            .parse_key(&["q", "x", "1", "64", "10", "5", "1.0", "0.0"])
            .unwrap_err();
        assert!(err.contains("Producers"));
    }

    #[test]
    fn test_schema_for_delays() {
        assert_eq!(RowSchema::for_delays(&[0], 100), RowSchema::WithoutDelay);
        assert_eq!(RowSchema::for_delays(&[], 100), RowSchema::WithoutDelay);
        assert_eq!(RowSchema::for_delays(&[0, 17_000], 100), RowSchema::WithDelay);
    }

    #[test]
    fn test_distinct_sub_threshold_delays_keep_column() {
        assert_eq!(RowSchema::for_delays(&[0, 50], 100), RowSchema::WithDelay);
        assert_eq!(RowSchema::for_delays(&[0, 0], 100), RowSchema::WithoutDelay);

        let schema = RowSchema::for_delays(&[0, 50], 100);
        let key = |delay_ns| {
            let configuration = Configuration {
                queue: "A".to_string(),
                threads: ThreadPair::new(1, 1),
                capacity: 64,
                ops: 1_000,
                delay_ns,
            };
            schema.key_of(RowKey::new(&configuration, 3))
        };
        assert_ne!(key(0), key(50));
    }
}
