//! Families served by the JSON monitor API: `VpnStatsV2` and `QueueStatsV2`

use crate::collector::{check_fields, emit_row, field_names, CollectContext, Collector, Field};
use crate::families::queue::{self, QueueRow};
use crate::families::vpn;
use async_trait::async_trait;
use scrape_broker::semp_v2::{self, encode_segment, MonitorRequest};
use scrape_broker::{Page, PagedQuery};
use scrape_core::{
    BrokerRequest, BrokerResponse, DataSource, Error, MetricDesc, MetricSink, Result,
};
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const VPN_FAMILY: &str = "VpnStatsV2";
pub const QUEUE_FAMILY: &str = "QueueStatsV2";

/// Field name, monitor attribute it is selected by
const VPN_ATTRIBUTES: &[(&str, &str)] = &[
    ("rx_rate", "rxMsgRate"),
    ("tx_rate", "txMsgRate"),
    ("spool_usage", "msgSpoolUsage"),
    ("spool_msgs", "msgSpoolMsgCount"),
];

const QUEUE_ATTRIBUTES: &[(&str, &str)] = &[
    ("spooled_msgs", "spooledMsgCount"),
    ("spool_usage", "msgSpoolUsage"),
    ("binds", "bindCount"),
];

static VPN_FIELDS: LazyLock<Vec<Field<MonitorVpn>>> = LazyLock::new(|| {
    let labels = &["vpn_name"];
    let spool_usage = Arc::new(MetricDesc::gauge(
        "broker_vpn_spool_usage_bytes",
        "Spool space used by the message VPN",
        labels,
    ));
    let spool_msgs = Arc::new(MetricDesc::gauge(
        "broker_vpn_spool_msgs",
        "Messages spooled in the message VPN",
        labels,
    ));

    vec![
        Field::new("rx_rate", &vpn::RX_MSG_RATE, |r: &MonitorVpn| r.rx_msg_rate),
        Field::new("tx_rate", &vpn::TX_MSG_RATE, |r: &MonitorVpn| r.tx_msg_rate),
        Field::new("spool_usage", &spool_usage, |r: &MonitorVpn| r.msg_spool_usage),
        Field::new("spool_msgs", &spool_msgs, |r: &MonitorVpn| r.msg_spool_msg_count),
    ]
});

static QUEUE_FIELDS: LazyLock<Vec<Field<QueueRow>>> = LazyLock::new(|| {
    vec![
        Field::new("spooled_msgs", &queue::SPOOLED_MSGS, |r: &QueueRow| r.spooled_msgs),
        Field::new("spool_usage", &queue::SPOOL_USAGE, |r: &QueueRow| r.spool_usage_bytes),
        Field::new("binds", &queue::BINDS, |r: &QueueRow| r.binds),
    ]
});

/// Monitor attributes to request for a source's field selection
fn select_for(source: &DataSource, key_attributes: &[&str], table: &[(&str, &str)]) -> Vec<String> {
    if source.fields.is_empty() {
        return Vec::new();
    }
    key_attributes
        .iter()
        .copied()
        .chain(
            table
                .iter()
                .filter(|(field, _)| source.selects(field))
                .map(|(_, attribute)| *attribute),
        )
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorVpn {
    pub msg_vpn_name: String,
    #[serde(default)]
    pub rx_msg_rate: Option<f64>,
    #[serde(default)]
    pub tx_msg_rate: Option<f64>,
    #[serde(default)]
    pub msg_spool_usage: Option<f64>,
    #[serde(default)]
    pub msg_spool_msg_count: Option<f64>,
}

/// `GET /msgVpns`, following `nextPageUri`
pub struct MonitorVpnQuery {
    target: String,
}

impl MonitorVpnQuery {
    pub fn new(source: &DataSource, page_size: u32) -> Self {
        Self {
            target: MonitorRequest::new("/msgVpns")
                .with_count(page_size)
                .with_match("msgVpnName", &source.scope)
                .with_select(select_for(source, &["msgVpnName"], VPN_ATTRIBUTES))
                .to_target(),
        }
    }
}

impl PagedQuery for MonitorVpnQuery {
    type Row = MonitorVpn;

    fn first_request(&self) -> BrokerRequest {
        BrokerRequest::Fetch {
            target: self.target.clone(),
        }
    }

    fn next_request(&self, cursor: &str) -> BrokerRequest {
        BrokerRequest::Fetch {
            target: cursor.to_string(),
        }
    }

    fn decode(&self, response: &BrokerResponse) -> Result<Page<MonitorVpn>> {
        semp_v2::decode_collection(&response.body)
    }

    fn row_key(&self, row: &MonitorVpn) -> String {
        row.msg_vpn_name.clone()
    }

    fn classify_status(&self, response: &BrokerResponse) -> Error {
        semp_v2::classify_status(response)
    }
}

pub struct VpnStatsV2Collector;

#[async_trait]
impl Collector for VpnStatsV2Collector {
    fn family(&self) -> &'static str {
        VPN_FAMILY
    }

    fn field_names(&self) -> Vec<&'static str> {
        field_names(&VPN_FIELDS)
    }

    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let rows = ctx.query(&MonitorVpnQuery::new(source, ctx.page_size())).await?;
        debug!("{} returned {} VPNs", source, rows.len());

        for row in &rows {
            emit_row(&VPN_FIELDS, source, row, &[row.msg_vpn_name.as_str()], sink)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorQueue {
    pub msg_vpn_name: String,
    pub queue_name: String,
    #[serde(default)]
    pub msg_spool_usage: Option<f64>,
    #[serde(default)]
    pub spooled_msg_count: Option<f64>,
    #[serde(default)]
    pub bind_count: Option<f64>,
}

impl From<MonitorQueue> for QueueRow {
    fn from(q: MonitorQueue) -> Self {
        Self {
            vpn: q.msg_vpn_name,
            name: q.queue_name,
            spooled_msgs: q.spooled_msg_count,
            spool_usage_bytes: q.msg_spool_usage,
            binds: q.bind_count,
            total_spooled: None,
        }
    }
}

/// `GET /msgVpns/{scope}/queues`, following `nextPageUri`
pub struct MonitorQueueQuery {
    target: String,
}

impl MonitorQueueQuery {
    pub fn new(source: &DataSource, page_size: u32) -> Self {
        Self {
            target: MonitorRequest::new(format!("/msgVpns/{}/queues", encode_segment(&source.scope)))
                .with_count(page_size)
                .with_match("queueName", &source.item)
                .with_select(select_for(
                    source,
                    &["msgVpnName", "queueName"],
                    QUEUE_ATTRIBUTES,
                ))
                .to_target(),
        }
    }
}

impl PagedQuery for MonitorQueueQuery {
    type Row = QueueRow;

    fn first_request(&self) -> BrokerRequest {
        BrokerRequest::Fetch {
            target: self.target.clone(),
        }
    }

    fn next_request(&self, cursor: &str) -> BrokerRequest {
        BrokerRequest::Fetch {
            target: cursor.to_string(),
        }
    }

    fn decode(&self, response: &BrokerResponse) -> Result<Page<QueueRow>> {
        let page = semp_v2::decode_collection::<MonitorQueue>(&response.body)?;
        Ok(Page::new(
            page.rows.into_iter().map(QueueRow::from).collect(),
            page.next_cursor,
        ))
    }

    fn row_key(&self, row: &QueueRow) -> String {
        row.key()
    }

    fn classify_status(&self, response: &BrokerResponse) -> Error {
        semp_v2::classify_status(response)
    }
}

pub struct QueueStatsV2Collector;

#[async_trait]
impl Collector for QueueStatsV2Collector {
    fn family(&self) -> &'static str {
        QUEUE_FAMILY
    }

    fn field_names(&self) -> Vec<&'static str> {
        field_names(&QUEUE_FIELDS)
    }

    /// The monitor API addresses queues below one VPN, so the scope must name one
    fn validate(&self, source: &DataSource) -> Result<()> {
        if source.scope_is_pattern() {
            return Err(Error::config(format!(
                "{} needs a concrete message VPN, got '{}'",
                QUEUE_FAMILY, source.scope
            )));
        }
        check_fields(QUEUE_FAMILY, &self.field_names(), source)
    }

    async fn collect(
        &self,
        ctx: &CollectContext,
        source: &DataSource,
        sink: &mut dyn MetricSink,
    ) -> Result<()> {
        let rows = ctx.query(&MonitorQueueQuery::new(source, ctx.page_size())).await?;
        debug!("{} returned {} queues", source, rows.len());

        for row in &rows {
            emit_row(&QUEUE_FIELDS, source, row, &[row.vpn.as_str(), row.name.as_str()], sink)?;
        }
        Ok(())
    }
}
