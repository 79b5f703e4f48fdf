use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::domain::{QueryId, Record};

/// Stamps every item with its own enrichment time and the owning query name.
pub fn enrich(items: Vec<Map<String, Value>>, query: &QueryId, clock: &dyn Clock) -> Vec<Record> {
    items
        .into_iter()
        .map(|fields| Record::new(fields, query, clock.timestamp()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use chrono::{DateTime, Local, TimeZone};
    use serde_json::json;

    use super::*;

    struct TickingClock {
        ticks: Cell<u32>,
    }

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Local> {
            let tick = self.ticks.get();
            self.ticks.set(tick + 1);
            Local.with_ymd_and_hms(2025, 3, 1, 8, 30, tick).unwrap()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    fn items() -> Vec<Map<String, Value>> {
        vec![
            json!({"ctxn_item": "A-1", "qty": 4}),
            json!({"ctxn_item": "B-2", "qty": 1}),
            json!({"ctxn_item": "C-3", "qty": 9}),
        ]
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
    }

    #[test]
    fn stamps_each_record() {
        let clock = TickingClock { ticks: Cell::new(0) };
        let query: QueryId = "Consulta_3".parse().unwrap();
        let records = enrich(items(), &query, &clock);

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.query_name() == Some("Consulta_3")));
        let stamps: Vec<_> = records.iter().filter_map(Record::load_timestamp).collect();
        assert_eq!(stamps.len(), 3);
        assert_ne!(stamps[0], stamps[2]);
        assert!(stamps.iter().all(|s| DateTime::parse_from_rfc3339(s).is_ok()));
    }

    #[test]
    fn preserves_order_and_upstream_fields() {
        let clock = TickingClock { ticks: Cell::new(0) };
        let query: QueryId = "Consulta_3".parse().unwrap();
        let records = enrich(items(), &query, &clock);
        let upstream: Vec<_> = records.iter().map(Record::upstream_fields).collect();
        assert_eq!(upstream, items());
    }
}
