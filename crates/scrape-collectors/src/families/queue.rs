//! `QueueStats`: per-queue spool depth, usage and binds

use crate::collector::{emit_row, field_names, CollectContext, Collector, Field};
use async_trait::async_trait;
use scrape_broker::{decode_reply, Page, PagedQuery, ShowCommand};
use scrape_core::{BrokerRequest, BrokerResponse, DataSource, MetricDesc, MetricSink, Result};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const FAMILY: &str = "QueueStats";

const LABELS: &[&str] = &["vpn_name", "queue_name"];

const BYTES_PER_MB: f64 = 1_048_576.0;

pub(crate) static SPOOLED_MSGS: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_queue_spool_msgs",
        "Messages currently spooled in the queue",
        LABELS,
    ))
});

pub(crate) static SPOOL_USAGE: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_queue_spool_usage_bytes",
        "Spool space used by the queue",
        LABELS,
    ))
});

pub(crate) static BINDS: LazyLock<Arc<MetricDesc>> = LazyLock::new(|| {
    Arc::new(MetricDesc::gauge(
        "broker_queue_binds",
        "Consumers bound to the queue",
        LABELS,
    ))
});

static FIELDS: LazyLock<Vec<Field<QueueRow>>> = LazyLock::new(|| {
    let total_spooled = Arc::new(MetricDesc::counter(
        "broker_queue_spooled_msgs_total",
        "Messages spooled to the queue since it was created",
        LABELS,
    ));

    vec![
        Field::new("spooled_msgs", &SPOOLED_MSGS, |r: &QueueRow| r.spooled_msgs),
        Field::new("spool_usage", &SPOOL_USAGE, |r: &QueueRow| r.spool_usage_bytes),
        Field::new("binds", &BINDS, |r: &QueueRow| r.binds),
        Field::new("total_spooled", &total_spooled, |r: &QueueRow| r.total_spooled),
    ]
});

#[derive(Debug, Deserialize)]
struct Rpc {
    show: Show,
}

#[derive(Debug, Deserialize)]
struct Show {
    queue: QueueShow,
}

#[derive(Debug, Default, Deserialize)]
struct QueueShow {
    #[serde(default)]
    queues: Option<Queues>,
}

#[derive(Debug, Default, Deserialize)]
struct Queues {
    #[serde(default)]
    queue: Vec<Queue>,
}

#[derive(Debug, Deserialize)]
struct Queue {
    name: String,
    #[serde(default)]
    info: Option<QueueInfo>,
    #[serde(default)]
    stats: Option<QueueStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct QueueInfo {
    message_vpn: Option<String>,
    num_messages_spooled: Option<f64>,
    current_spool_usage_in_mb: Option<f64>,
    bind_count: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueueStats {
    #[serde(rename = "message-spool-stats", default)]
    message_spool_stats: Option<MessageSpoolStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MessageSpoolStats {
    total_messages_spooled: Option<f64>,
}

/// One queue's statistics
#[derive(Debug, Clone, PartialEq)]
pub struct QueueRow {
    pub vpn: String,
    pub name: String,
    pub spooled_msgs: Option<f64>,
    pub spool_usage_bytes: Option<f64>,
    pub binds: Option<f64>,
    pub total_spooled: Option<f64>,
}

impl QueueRow {
    /// Deduplication key shared by both queue families
    pub fn key(&self) -> String {
        format!("{}/{}", self.vpn, self.name)
    }

    fn from_xml(queue: Queue, scope: &str) -> Self {
        let info = queue.info.unwrap_or_default();
        let spool = queue
            .stats
            .and_then(|s| s.message_spool_stats)
            .unwrap_or_default();
        Self {
            vpn: info.message_vpn.unwrap_or_else(|| scope.to_string()),
            name: queue.name,
            spooled_msgs: info.num_messages_spooled,
            spool_usage_bytes: info.current_spool_usage_in_mb.map(|mb| mb * BYTES_PER_MB),
            binds: info.bind_count,
            total_spooled: spool.total_messages_spooled,
        }
    }
}

/// `show queue <item> message-vpn <scope> stats`, paged
pub struct QueueStatsQuery {
    command: String,
    scope: String,
}

impl QueueStatsQuery {
    pub fn new(source: &DataSource, page_size: u32) -> Self {
        Self {
            command: ShowCommand::new("queue")
                .arg("name", &source.item)
                .arg("vpn-name", &source.scope)
                .flag("stats")
                .paged(page_size)
                .to_xml(),
            scope: source.scope.clone(),
        }
    }
}

impl PagedQuery for QueueStatsQuery {
    type Row = QueueRow;

    fn first_request(&self) -> BrokerRequest {
        BrokerRequest::Command {
            body: self.command.clone(),
        }
    }

    fn next_request(&self, cursor: &str) -> BrokerRequest {
        BrokerRequest::Command {
            body: cursor.to_string(),
        }
    }

    fn decode(&self, response: &BrokerResponse) -> Result<Page<QueueRow>> {
        let reply = decode_reply::<Rpc>(&response.body)?;
        let rows = reply
            .payload
            .show
            .queue
            .queues
            .unwrap_or_default()
            .queue
            .into_iter()
            .map(|q| QueueRow::from_xml(q, &self.scope))
            .collect();
        Ok(Page::new(rows, reply.more_cookie))
    }

    fn row_key(&self, row: &QueueRow) -> String {
        row.key()
    }
}

pub struct QueueStatsCollector;

#[async_trait]
impl Collector for QueueStatsCollector {
    fn family(&self) -> &'static str {
        FAMILY
    }

    fn field_names(&self) -> Vec<&'static str> {
        field_names(&FIELDS)
    }

    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let rows = ctx.query(&QueueStatsQuery::new(source, ctx.page_size())).await?;
        debug!("{} returned {} queues", source, rows.len());

        for row in &rows {
            emit_row(&FIELDS, source, row, &[row.vpn.as_str(), row.name.as_str()], sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_dev::fixtures::{queue_row, queues_xml, xml_reply};

    #[test]
    fn test_decode_queue_page() {
        let query = QueueStatsQuery::new(&DataSource::new(FAMILY).with_scope("default"), 2);
        let response = xml_reply(
            &queues_xml(&[queue_row("default", "orders", 4), queue_row("default", "audit", 0)]),
            None,
        );

        let page = query.decode(&response).unwrap();
        assert_eq!(page.next_cursor, None);
        assert_eq!(page.rows.len(), 2);

        let orders = &page.rows[0];
        assert_eq!(orders.key(), "default/orders");
        assert_eq!(orders.spooled_msgs, Some(4.0));
        assert_eq!(orders.spool_usage_bytes, Some(1.5 * BYTES_PER_MB));
        assert_eq!(orders.binds, Some(1.0));
        assert_eq!(orders.total_spooled, Some(40.0));
    }

    #[test]
    fn test_decode_empty_result() {
        let query = QueueStatsQuery::new(&DataSource::new(FAMILY), 2);
        let page = query.decode(&xml_reply("<queue/>", None)).unwrap();
        assert!(page.rows.is_empty());
    }

    #[test]
    fn test_request_carries_filters() {
        let source = DataSource::new(FAMILY).with_filter("default|orders*").unwrap();
        match QueueStatsQuery::new(&source, 100).first_request() {
            BrokerRequest::Command { body } => {
                assert!(body.starts_with("<rpc><show><queue><name>orders*</name>"));
                assert!(body.contains("<vpn-name>default</vpn-name><stats/>"));
            }
            other => panic!("unexpected request {:?}", other),
        }
    }
}
