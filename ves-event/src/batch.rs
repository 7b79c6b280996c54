// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use crate::Event;

/// An ordered list of events posted through the batch interface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch(Vec<Event>);

impl Batch {
    pub fn new() -> Self {
        Batch(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, event: impl Into<Event>) {
        self.0.push(event.into());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.0.iter()
    }

    /// Cut the batch into two batches of near-equal length (±1).
    pub fn split(self) -> (Batch, Batch) {
        let mut head = self.0;
        let tail = head.split_off(head.len() / 2);
        (Batch(head), Batch(tail))
    }

    /// Fill the `reportingEntityName` field of every event that does not
    /// already carry one. Events with the field set are left untouched.
    pub fn update_reporting_entity_name(&mut self, name: &str) {
        for evt in &mut self.0 {
            let header = evt.header_mut();
            if header.reporting_entity_name.is_empty() {
                header.reporting_entity_name = name.to_string();
            }
        }
    }

    /// Same as [`Batch::update_reporting_entity_name`] for the entity id.
    pub fn update_reporting_entity_id(&mut self, id: &str) {
        for evt in &mut self.0 {
            let header = evt.header_mut();
            if header.reporting_entity_id.is_empty() {
                header.reporting_entity_id = id.to_string();
            }
        }
    }
}

impl From<Vec<Event>> for Batch {
    fn from(events: Vec<Event>) -> Self {
        Batch(events)
    }
}

impl IntoIterator for Batch {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HeartbeatEvent;

    fn heartbeat(id: &str) -> Event {
        HeartbeatEvent::new(id, "heartbeat_test", "vnf", 60).into()
    }

    #[test]
    fn test_split_even() {
        let batch = Batch::from(vec![heartbeat("a"), heartbeat("b"), heartbeat("c"), heartbeat("d")]);
        let (left, right) = batch.split();
        assert_eq!(left.len(), 2);
        assert_eq!(right.len(), 2);
    }

    #[test]
    fn test_split_odd_and_single() {
        let batch = Batch::from(vec![heartbeat("a"), heartbeat("b"), heartbeat("c")]);
        let (left, right) = batch.split();
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 2);

        let single = Batch::from(vec![heartbeat("only")]);
        let (left, right) = single.split();
        assert_eq!(left.len(), 0);
        assert_eq!(right.len(), 1);
    }

    #[test]
    fn test_reporting_entity_defaulting() {
        let mut batch = Batch::from(vec![heartbeat("a")]);
        batch.update_reporting_entity_name("entity");
        batch.update_reporting_entity_name("other");
        assert_eq!(batch.iter().next().unwrap().header().reporting_entity_name, "entity");
    }

    #[test]
    fn test_serialize_as_list() {
        let batch = Batch::from(vec![heartbeat("a")]);
        let json = serde_json::to_value(&batch).unwrap();
        assert!(json.is_array());
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
