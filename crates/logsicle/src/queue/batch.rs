use std::collections::{BTreeMap, VecDeque};

use tracing::warn;

use crate::queue::item::QueueItem;
use crate::resource::ResourceType;

/// Items taken from the front of the queue for one send.
#[derive(Debug, Default)]
pub struct Batch {
    items: Vec<QueueItem>,
}

impl Batch {
    /// Pops items from the front of `queue` until `max_items` is reached or the next item would
    /// push the serialized array past `max_bytes`. A single oversized item still forms a batch
    /// on its own so it can never wedge the queue.
    pub fn take_from(queue: &mut VecDeque<QueueItem>, max_items: usize, max_bytes: usize) -> Self {
        let mut items = Vec::with_capacity(max_items.min(queue.len()));
        // opening and closing brackets
        let mut bytes = 2;

        while items.len() < max_items {
            let Some(item) = queue.pop_front() else {
                break;
            };
            let separator = usize::from(!items.is_empty());
            let item_bytes = item.encoded_len() + separator;
            if !items.is_empty() && bytes + item_bytes > max_bytes {
                queue.push_front(item);
                break;
            }
            if items.is_empty() && bytes + item_bytes > max_bytes {
                warn!(
                    "LOGSICLE | {} record of {} bytes exceeds the {} byte batch limit, sending it alone",
                    item.resource_type(),
                    item.encoded_len(),
                    max_bytes
                );
                items.push(item);
                break;
            }
            bytes += item_bytes;
            items.push(item);
        }

        Self { items }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn min_seq(&self) -> Option<u64> {
        self.items.iter().map(|item| item.seq).min()
    }

    /// Splits the batch into one group per resource type, keeping enqueue order inside each.
    #[must_use]
    pub fn into_groups(self) -> Vec<TypeGroup> {
        let mut groups: BTreeMap<ResourceType, Vec<QueueItem>> = BTreeMap::new();
        for item in self.items {
            groups.entry(item.resource_type()).or_default().push(item);
        }
        groups
            .into_iter()
            .map(|(resource_type, items)| TypeGroup {
                resource_type,
                items,
            })
            .collect()
    }
}

/// Items of a single resource type, sent as one request.
#[derive(Debug)]
pub struct TypeGroup {
    pub resource_type: ResourceType,
    pub items: Vec<QueueItem>,
}

impl TypeGroup {
    /// Serializes the payloads as a JSON array.
    ///
    /// # Errors
    ///
    /// Propagates serializer failures.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let payloads: Vec<_> = self.items.iter().map(|item| &item.data.payload).collect();
        serde_json::to_vec(&payloads)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Highest attempt count among the items, i.e. the retries this group needed.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.items.iter().map(|item| item.attempts).max().unwrap_or(0)
    }
}
